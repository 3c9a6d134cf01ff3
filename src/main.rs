//! Hive - 多 Agent 客服路由框架
//!
//! 入口：初始化日志、加载配置、组装运行时，然后在标准输入上逐行对话。
//! 用法：`hive [config.toml]`；空行忽略，`/graph` 打印拓扑，`/resume` 从最近检查点继续，`/quit` 退出。

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use hive::{config::load_config, llm::create_oracle_from_config, observability, HiveRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let oracle = create_oracle_from_config(&cfg);
    let runtime = HiveRuntime::from_config(&cfg, oracle).context("Failed to build agent graph")?;

    let session = HiveRuntime::new_session_id();
    tracing::info!(session = %session, "session started");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read stdin")? == 0 {
            break;
        }
        let input = line.trim();
        let result = match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/graph" => {
                println!("{}", runtime.describe());
                continue;
            }
            "/resume" => runtime.resume(&session).await,
            text => runtime.run_turn(&session, text).await,
        };

        match result {
            Ok(outcome) => match outcome.reply {
                Some(reply) => println!("{}", reply),
                None => println!("(no reply, {} steps)", outcome.steps),
            },
            Err(e) if e.is_routing() => {
                tracing::warn!(error = %e, "turn aborted by routing error");
                println!("Sorry, something went wrong routing your request.");
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("Sorry, I could not complete that. Type /resume to retry.");
            }
        }
    }
    Ok(())
}
