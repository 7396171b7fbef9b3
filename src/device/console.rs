use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::executor::user::UserChannel;

/// User channel on the controlling terminal.
pub struct ConsoleChannel {
    input: Mutex<BufReader<Stdin>>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

async fn print(line: &str) -> DroidClawResult<()> {
    let mut out = tokio::io::stdout();
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

#[async_trait]
impl UserChannel for ConsoleChannel {
    async fn speak(&self, text: &str) -> DroidClawResult<()> {
        print(&format!("[agent] {text}\n")).await
    }

    async fn ask(&self, question: &str) -> DroidClawResult<String> {
        let mut input = self.input.lock().await;
        print(&format!("[agent asks] {question}\n> ")).await?;
        let mut answer = String::new();
        let read = input.read_line(&mut answer).await?;
        if read == 0 {
            return Err(DroidClawError::Executor("no answer: stdin is closed".into()));
        }
        Ok(answer.trim().to_string())
    }
}
