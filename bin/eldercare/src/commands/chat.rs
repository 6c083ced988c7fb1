use eldercare_agent::{ChatReply, ChatRequest};
use eldercare_core::types::HistoryTurn;
use std::io::{self, BufRead, Write};

use super::load_context;

fn print_reply(reply: &ChatReply) {
    for action in &reply.actions_taken {
        println!("  [{}] {}", action.tool, action.result);
    }
    println!("{}", reply.response);
}

pub async fn run(patient_id: String, message: Option<String>) -> anyhow::Result<()> {
    let ctx = load_context()?;

    if let Some(message) = message {
        let reply = ctx
            .orchestrator
            .chat(&ChatRequest {
                patient_id,
                message,
                history: Vec::new(),
                location: None,
            })
            .await?;
        print_reply(&reply);
        return Ok(());
    }

    println!("ElderCare assistant (patient {}). Type 'exit' to quit.", patient_id);
    let mut history: Vec<HistoryTurn> = Vec::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let reply = ctx
            .orchestrator
            .chat(&ChatRequest {
                patient_id: patient_id.clone(),
                message: line.to_string(),
                history: history.clone(),
                location: None,
            })
            .await?;
        print_reply(&reply);

        history.push(HistoryTurn::new("user", line));
        history.push(HistoryTurn::new("assistant", &reply.response));
    }

    Ok(())
}
