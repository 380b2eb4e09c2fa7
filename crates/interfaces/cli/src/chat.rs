//! Interactive advisor REPL on stdin/stdout.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use fincoach_runtime::Advisor;

pub async fn run(advisor: &mut Advisor) -> Result<()> {
    println!("fincoach: tell me about your balances, debts, and goals. 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "you> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match advisor.handle_turn(line).await {
            Ok(reply) => {
                for exec in &reply.tool_executions {
                    let marker = if exec.success { "✓" } else { "✗" };
                    println!("  [{marker} {}]", exec.tool_name);
                }
                println!("fincoach> {}\n", reply.content.trim());
            }
            Err(error) => {
                eprintln!("error: {error:#}\n");
            }
        }
    }

    Ok(())
}
