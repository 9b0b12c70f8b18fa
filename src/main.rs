mod cli;

use adbsync_lib::config::{resolve_config_dir, AppConfig};
use adbsync_lib::logging::init_logging;
use adbsync_lib::{
    AdbShell, RemoteShell, SyncController, SyncError, SyncEvent, SyncRequest, SyncResult, SyncTask,
};
use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 用户取消时的退出码
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().unwrap_or_else(resolve_config_dir);
    let config = AppConfig::load(&config_dir);
    init_logging(&config_dir, &config.log);
    info!("配置目录: {:?}", config_dir);

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig) -> anyhow::Result<ExitCode> {
    if let Some(adb) = cli.adb {
        config.adb.path = adb;
    }
    if let Some(delay) = cli.delay_ms {
        config.sync.step_delay_ms = delay;
    }

    let recursive = config.sync.recursive;
    let (request, task) = match cli.command {
        Command::Pull(args) => (
            SyncRequest {
                device: cli.device,
                local_root: args.local,
                remote_root: args.remote,
                recursive: recursive && !args.no_recursive,
            },
            SyncTask::Pull,
        ),
        Command::Push(args) => (
            SyncRequest {
                device: cli.device,
                local_root: args.local,
                remote_root: args.remote,
                recursive: recursive && !args.no_recursive,
            },
            SyncTask::Push,
        ),
        Command::PushFiles(args) => (
            SyncRequest {
                device: cli.device,
                local_root: Default::default(),
                remote_root: args.remote,
                recursive: recursive && !args.no_recursive,
            },
            SyncTask::PushPaths(args.paths),
        ),
    };

    let shell: Arc<dyn RemoteShell> = Arc::new(AdbShell::with_config(&config.adb));
    let controller = Arc::new(SyncController::new(shell, config.sync.clone()));

    let (tx, mut rx) = mpsc::channel::<SyncEvent>(256);
    controller.start(request, task, Some(tx)).await;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let SyncEvent::Status(line) = event {
                println!("{}", line);
            }
        }
    });

    let interrupt = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，正在取消同步");
                controller.cancel().await;
            }
        })
    };

    let outcome = controller.wait().await.context("sync session did not start")?;
    interrupt.abort();
    let _ = printer.await;

    match outcome {
        Ok(result) => {
            print_summary(&result);
            Ok(if result.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(SyncError::Cancelled(result)) => {
            print_summary(&result);
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_summary(result: &SyncResult) {
    println!();
    println!(
        "Succeeded: {}, Failed: {}",
        result.succeeded.len(),
        result.failed.len()
    );
    for item in &result.failed {
        eprintln!("  {}", item);
    }
}
