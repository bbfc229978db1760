use std::io::{self, BufRead, Write};

use ucem_sync::Prompt;

/// Terminal prompt: reports go to stdout, answers come from stdin.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn show(&self, text: &str) {
        println!("{text}");
    }

    fn confirm(&self, action: &str) -> bool {
        print!("\nAre you sure you want to {action}? (y/n): ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
