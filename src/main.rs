//! Quill - 多智能体内容创作管线
//!
//! 用法：
//!   quill run <request...>     跑完整流水线，结果以 JSON 打印
//!   quill chat <message...>    与通用助手对话，回复流式输出到终端
//!
//! Ctrl+C 取消当前运行；退出前推送缓冲的 trace。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill::config::load_config;
use quill::core::{
    assistant_agent, ContentAgents, ContentPipeline, ExecutionContext, ShutdownCoordinator,
    ShutdownManager, TraceFlushCleanup,
};

/// Quill 多智能体内容创作管线
#[derive(Parser, Debug)]
#[command(name = "quill", about = "Multi-agent content pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and print the result as JSON.
    Run {
        /// Content request, e.g. "Create a LinkedIn post about AI trends".
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },
    /// Chat with the assistant agent; the reply is streamed to stdout.
    Chat {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    quill::observability::init();

    let cfg = load_config(cli.config).context("Failed to load config")?;
    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let ctx = ExecutionContext::from_config(&cfg).with_cancel(shutdown.token());
    let mut coordinator = ShutdownCoordinator::new(shutdown);
    coordinator.register(TraceFlushCleanup::new(ctx.sink.clone()));

    match cli.command {
        Command::Run { request } => {
            let request = request.join(" ");
            let agents = ContentAgents::from_config(&cfg).context("Failed to build agents")?;
            let pipeline = ContentPipeline::new(agents);
            let result = coordinator
                .run(pipeline.run(&request, &ctx))
                .await
                .context("Interrupted")?
                .context("Pipeline failed")?;
            let json = serde_json::to_string_pretty(&result).context("Failed to encode result")?;
            println!("{json}");
        }
        Command::Chat { message } => {
            let message = message.join(" ");
            let agent = assistant_agent(&cfg).context("Failed to build assistant")?;
            let stream = agent.stream(Vec::new(), message, ctx.clone());
            let mut stdout = std::io::stdout();
            let run = coordinator
                .run(stream.run(&mut stdout))
                .await
                .context("Interrupted")?
                .context("Chat failed")?;
            println!();
            tracing::info!(
                steps = run.steps,
                total_tokens = run.usage.total(),
                "chat finished"
            );
        }
    }
    Ok(())
}
