//! Slash-command parsing for the chat REPL.

/// A parsed `/command` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Quit,
    Clear,
    Providers,
    /// `/switch <name>`; `None` when the name is missing.
    Switch(Option<String>),
    Tools,
    /// `/search <query>`; `None` when the query is missing.
    Search(Option<String>),
    /// `/chunks <query>`; `None` when the query is missing.
    Chunks(Option<String>),
    Unknown(String),
}

impl ChatCommand {
    /// Parse a line. Returns `None` for plain chat input (no leading `/`).
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('/')?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        let arg = (!args.is_empty()).then(|| args.to_string());

        let command = match name.to_lowercase().as_str() {
            "help" => ChatCommand::Help,
            "quit" | "exit" => ChatCommand::Quit,
            "clear" => ChatCommand::Clear,
            "providers" => ChatCommand::Providers,
            "switch" => ChatCommand::Switch(arg),
            "tools" => ChatCommand::Tools,
            "search" => ChatCommand::Search(arg),
            "chunks" => ChatCommand::Chunks(arg),
            other => ChatCommand::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Help text shown by `/help`.
pub const HELP_TEXT: &str = "\
Document Chat Commands
----------------------
Chat:
   Just type your question to chat with the documents

System:
   /help           - Show this help
   /providers      - List available LLM providers
   /switch <name>  - Switch to a different provider
   /tools          - Show available MCP tools
   /search <query> - Search document catalog
   /chunks <query> - Search document chunks
   /clear          - Clear conversation history
   /quit           - Exit the app

Examples:
   What documents do we have?
   /search healthcare system
   /switch openai";
