//! Interactive document chat loop.
//!
//! Each user question first pulls context from the tool server (catalog
//! search, then chunk search), then asks the current LLM provider. Tool
//! and provider failures are printed and the loop keeps going.

use std::future::Future;
use std::io::{BufRead, Write};

use tokio::sync::mpsc;

use super::commands::{ChatCommand, HELP_TEXT};
use crate::inference::{ChatMessage, ProviderManager};
use crate::mcp_client::McpClient;

/// The chat REPL: MCP client, LLM providers, and the running conversation.
pub struct ChatApp<W: Write> {
    mcp: McpClient,
    providers: ProviderManager,
    conversation: Vec<ChatMessage>,
    running: bool,
    out: W,
}

impl<W: Write> ChatApp<W> {
    /// `mcp` should already be connected; an unconnected client still works
    /// but every lookup reports an error.
    pub fn new(mcp: McpClient, providers: ProviderManager, out: W) -> Self {
        Self {
            mcp,
            providers,
            conversation: Vec::new(),
            running: true,
            out,
        }
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    // ─── Loop ────────────────────────────────────────────────────────────

    /// Read lines until `/quit`, EOF, or Ctrl-C, then shut the server down.
    pub async fn run(&mut self, lines: mpsc::Receiver<String>) -> std::io::Result<()> {
        self.run_until(lines, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Like [`run`](Self::run), but stops when `interrupt` completes.
    pub async fn run_until<F>(
        &mut self,
        lines: mpsc::Receiver<String>,
        interrupt: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        writeln!(self.out, "{}", "=".repeat(60))?;
        writeln!(self.out, "Welcome to Document Chat!")?;
        writeln!(self.out, "Type your questions or use /help for commands")?;
        writeln!(self.out, "{}", "=".repeat(60))?;

        let result = self.read_loop(lines, interrupt).await;
        self.cleanup().await;
        result
    }

    async fn read_loop<F>(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        interrupt: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        while self.running {
            write!(self.out, "\nYou: ")?;
            self.out.flush()?;

            let line = tokio::select! {
                line = lines.recv() => line,
                _ = &mut interrupt => {
                    tracing::info!("interrupted");
                    None
                }
            };

            let Some(line) = line else {
                writeln!(self.out, "\nGoodbye!")?;
                break;
            };

            self.handle_line(&line).await?;
        }

        Ok(())
    }

    /// Shut the tool server down. Safe to call more than once.
    pub async fn cleanup(&mut self) {
        tracing::info!("chat session ending, shutting down MCP server");
        self.mcp.shutdown().await;
    }

    /// Dispatch one input line to a command or a chat turn.
    pub async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match ChatCommand::parse(line) {
            Some(command) => self.handle_command(command).await,
            None => self.handle_chat(line).await,
        }
    }

    // ─── Commands ────────────────────────────────────────────────────────

    pub async fn handle_command(&mut self, command: ChatCommand) -> std::io::Result<()> {
        match command {
            ChatCommand::Help => writeln!(self.out, "{HELP_TEXT}")?,
            ChatCommand::Quit => {
                writeln!(self.out, "Goodbye!")?;
                self.running = false;
            }
            ChatCommand::Clear => {
                self.conversation.clear();
                writeln!(self.out, "Conversation cleared!")?;
            }
            ChatCommand::Providers => {
                writeln!(
                    self.out,
                    "Current: {}",
                    self.providers.current_name().unwrap_or("none")
                )?;
                for (name, display, current) in self.providers.describe() {
                    let marker = if current { "*" } else { " " };
                    writeln!(self.out, "{marker} {name}: {display}")?;
                }
            }
            ChatCommand::Switch(None) => {
                writeln!(
                    self.out,
                    "Please specify provider name. Use /providers to see available options."
                )?;
            }
            ChatCommand::Switch(Some(name)) => match self.providers.switch(&name) {
                Ok(provider) => {
                    let provider_name = provider.display_name();
                    writeln!(self.out, "Switched to: {provider_name}")?;
                }
                Err(e) => writeln!(self.out, "{e}")?,
            },
            ChatCommand::Tools => {
                writeln!(self.out, "Available MCP Tools:")?;
                for tool in self.mcp.tools().iter() {
                    writeln!(self.out, "   - {}: {}", tool.name, tool.description)?;
                }
            }
            ChatCommand::Search(None) | ChatCommand::Chunks(None) => {
                writeln!(self.out, "Please provide a search query")?;
            }
            ChatCommand::Search(Some(query)) => {
                writeln!(self.out, "Searching catalog for: {query}")?;
                let result = self.mcp.search_catalog(&query).await;
                self.print_search_result(result)?;
            }
            ChatCommand::Chunks(Some(query)) => {
                writeln!(self.out, "Searching chunks for: {query}")?;
                let result = self.mcp.search_chunks(&query, None).await;
                self.print_search_result(result)?;
            }
            ChatCommand::Unknown(name) => {
                writeln!(
                    self.out,
                    "Unknown command: {name}. Type /help for available commands."
                )?;
            }
        }
        Ok(())
    }

    fn print_search_result(
        &mut self,
        result: Result<String, crate::mcp_client::McpError>,
    ) -> std::io::Result<()> {
        match result {
            Ok(text) => writeln!(self.out, "Result:\n{text}"),
            Err(e) => writeln!(self.out, "Search error: {e}"),
        }
    }

    // ─── Chat Turn ───────────────────────────────────────────────────────

    /// Gather document context for `query`.
    ///
    /// Results carrying `"Error:"` are left out; a failed lookup stops the
    /// search and is reported inside the context instead.
    pub async fn relevant_context(&mut self, query: &str) -> Option<String> {
        let mut parts = Vec::new();

        match self.mcp.search_catalog(query).await {
            Ok(catalog) => {
                if is_useful(&catalog) {
                    parts.push(format!("Document Catalog Results:\n{catalog}"));
                }
                match self.mcp.search_chunks(query, None).await {
                    Ok(chunks) if is_useful(&chunks) => {
                        parts.push(format!("Document Chunks:\n{chunks}"));
                    }
                    Ok(_) => {}
                    Err(e) => parts.push(format!("Error retrieving context: {e}")),
                }
            }
            Err(e) => parts.push(format!("Error retrieving context: {e}")),
        }

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// One chat turn: context lookup, provider call, conversation update.
    pub async fn handle_chat(&mut self, input: &str) -> std::io::Result<()> {
        writeln!(self.out, "Searching documents for relevant information...")?;
        let context = self.relevant_context(input).await;

        self.conversation.push(ChatMessage::user(input));

        let Some(provider) = self.providers.current() else {
            writeln!(self.out, "No LLM provider available!")?;
            return Ok(());
        };

        let provider_name = provider.display_name();
        writeln!(self.out, "Generating response with {provider_name}...")?;

        match provider.chat(&self.conversation, context.as_deref()).await {
            Ok(reply) => {
                writeln!(self.out, "\n{provider_name}:\n{reply}")?;
                self.conversation.push(ChatMessage::assistant(reply));
            }
            Err(e) => {
                tracing::warn!(provider = %provider_name, error = %e, "chat request failed");
                writeln!(self.out, "Error generating response: {e}")?;
            }
        }
        Ok(())
    }
}

/// Read terminal lines on a dedicated thread.
///
/// The thread blocks in `read_line` and is never joined, so an interrupted
/// chat can exit without waiting for one more line of input. The channel
/// closes on EOF or a read error.
pub fn spawn_line_reader<R>(input: R) -> std::io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("chat-input".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "input read failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn is_useful(result: &str) -> bool {
    !result.is_empty() && !result.contains("Error:")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ChatProvider, InferenceError, Role};
    use crate::mcp_client::{ClientConfig, ServerConfig};
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn display_name(&self) -> String {
            "Echo".to_string()
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            context: Option<&str>,
        ) -> Result<String, InferenceError> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("echo: {last} (context: {})", context.is_some()))
        }
    }

    struct DownProvider;

    #[async_trait]
    impl ChatProvider for DownProvider {
        fn display_name(&self) -> String {
            "Ollama (llama3.2)".to_string()
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _context: Option<&str>,
        ) -> Result<String, InferenceError> {
            Err(InferenceError::ConnectionFailed {
                endpoint: "http://localhost:11434".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn app() -> ChatApp<Vec<u8>> {
        let mcp = McpClient::new(ClientConfig::new(ServerConfig::new("node", &[])));
        let mut providers = ProviderManager::new();
        providers.add("echo", Box::new(EchoProvider));
        ChatApp::new(mcp, providers, Vec::new())
    }

    fn printed(app: &ChatApp<Vec<u8>>) -> String {
        String::from_utf8_lossy(app.output()).into_owned()
    }

    #[test]
    fn test_is_useful() {
        assert!(is_useful("3 matches"));
        assert!(!is_useful(""));
        assert!(!is_useful("Error: Method not found"));
    }

    #[tokio::test]
    async fn test_quit_stops_loop() {
        let mut app = app();
        app.handle_line("/quit").await.unwrap();
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn test_chat_turn_records_conversation() {
        let mut app = app();
        app.handle_line("what is in the index?").await.unwrap();

        let conversation = app.conversation();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].role, Role::User);
        assert_eq!(conversation[1].role, Role::Assistant);
        // Unconnected client: the lookup failure is reported as context.
        assert_eq!(conversation[1].content, "echo: what is in the index? (context: true)");
    }

    #[tokio::test]
    async fn test_clear_empties_conversation() {
        let mut app = app();
        app.handle_line("hello").await.unwrap();
        app.handle_line("/clear").await.unwrap();
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_search_without_connection_prints_error() {
        let mut app = app();
        app.handle_line("/search healthcare").await.unwrap();
        assert!(printed(&app).contains("Search error: not connected"));
    }

    #[tokio::test]
    async fn test_failed_chat_turn_keeps_only_user_message() {
        let mcp = McpClient::new(ClientConfig::new(ServerConfig::new("node", &[])));
        let mut providers = ProviderManager::new();
        providers.add("ollama", Box::new(DownProvider));
        let mut app = ChatApp::new(mcp, providers, Vec::new());

        app.handle_line("summarize the report").await.unwrap();

        let out = printed(&app);
        assert!(out.contains("Generating response with Ollama (llama3.2)..."));
        assert!(out.contains("Error generating response:"), "output: {out}");
        assert_eq!(app.conversation().len(), 1);
        assert!(app.is_running());
    }

    #[tokio::test]
    async fn test_switch_unknown_provider() {
        let mut app = app();
        app.handle_line("/switch openai").await.unwrap();
        assert!(printed(&app).contains("provider 'openai' not found"));
    }

    fn input(lines: &[&str]) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send(line.to_string()).unwrap();
        }
        (tx, rx)
    }

    #[tokio::test]
    async fn test_run_ends_on_eof() {
        let mut app = app();
        let (tx, rx) = input(&["/help"]);
        drop(tx);
        app.run_until(rx, std::future::pending()).await.unwrap();
        let out = printed(&app);
        assert!(out.contains("Document Chat Commands"));
        assert!(out.contains("Goodbye!"));
    }

    #[tokio::test]
    async fn test_interrupt_ends_loop_while_input_is_open() {
        let mut app = app();
        // Sender kept alive: without the interrupt the loop would wait forever.
        let (_tx, rx) = input(&[]);
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            app.run_until(rx, async {}),
        )
        .await
        .expect("interrupt should end the loop")
        .unwrap();

        assert!(printed(&app).contains("Goodbye!"));
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_quit_stops_before_remaining_input() {
        let mut app = app();
        let (_tx, rx) = input(&["/quit", "never handled"]);
        app.run_until(rx, std::future::pending()).await.unwrap();
        assert!(!app.is_running());
        assert!(app.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_line_reader_closes_on_eof() {
        let source = std::io::Cursor::new(b"first\nsecond\n".to_vec());
        let mut rx = spawn_line_reader(source).unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
        assert_eq!(rx.recv().await, None);
    }
}
