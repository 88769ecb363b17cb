//! Line-oriented console state machine.
//!
//! The console owns no IO: each input line or server event yields a list of
//! [`Effect`]s for the caller to carry out.

use pylens_protocol::{Command, InspectionNode, ServerEvent};

use crate::navigator::PathNavigator;
use crate::tree::{Detail, RenderedTree, render_tree};

pub const WAITING_MESSAGE: &str = "Waiting for Python connection...";

pub const HELP: &str = "\
Type Python code; a blank line runs the block.
  :i <expr>     inspect an expression
  :open <n>     inspect row n of the current tree
  :run <n>      stage a call to method n as the pending block
  :back         previous inspected path
  :forward      next inspected path
  :modules      inspect sys.modules
  :help         show this help
  :quit         exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a command to the relay.
    Send(Command),
    Print(String),
    Quit,
}

#[derive(Debug, Default)]
pub struct Console {
    navigator: PathNavigator,
    block: Vec<String>,
    connected: bool,
    tree: Option<RenderedTree>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn pending_block(&self) -> &[String] {
        &self.block
    }

    pub fn tree(&self) -> Option<&RenderedTree> {
        self.tree.as_ref()
    }

    pub fn navigator(&self) -> &PathNavigator {
        &self.navigator
    }

    pub fn prompt(&self) -> &'static str {
        if self.block.is_empty() { ">>> " } else { "... " }
    }

    pub fn handle_input(&mut self, line: &str) -> Vec<Effect> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = line.trim_start().strip_prefix(':') {
            return self.handle_command(rest.trim());
        }
        if line.trim().is_empty() {
            return self.submit_block();
        }
        self.block.push(line.to_string());
        Vec::new()
    }

    fn submit_block(&mut self) -> Vec<Effect> {
        if self.block.is_empty() {
            return Vec::new();
        }
        if !self.connected {
            return vec![Effect::Print(WAITING_MESSAGE.to_string())];
        }
        let code = std::mem::take(&mut self.block).join("\n");
        vec![Effect::Send(Command::repl(code))]
    }

    fn handle_command(&mut self, input: &str) -> Vec<Effect> {
        let (name, arg) = match input.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (input, ""),
        };

        match name {
            "q" | "quit" => vec![Effect::Quit],
            "h" | "help" => vec![Effect::Print(HELP.to_string())],
            "i" | "inspect" => {
                if arg.is_empty() {
                    return vec![Effect::Print("usage: :i <expr>".to_string())];
                }
                self.when_connected(|nav| nav.enter(arg))
            }
            "modules" => self.when_connected(|nav| nav.enter("sys.modules")),
            "back" => {
                if self.connected && !self.navigator.can_go_back() {
                    return vec![Effect::Print("no earlier path".to_string())];
                }
                self.when_connected(PathNavigator::back)
            }
            "forward" => {
                if self.connected && !self.navigator.can_go_forward() {
                    return vec![Effect::Print("no later path".to_string())];
                }
                self.when_connected(PathNavigator::forward)
            }
            "open" => match self.row_path(arg) {
                Ok(path) => self.when_connected(|nav| nav.navigate(path)),
                Err(message) => vec![Effect::Print(message)],
            },
            "run" => self.stage_run(arg),
            other => vec![Effect::Print(format!(
                "unknown command :{other} (try :help)"
            ))],
        }
    }

    /// Apply a navigator move only while the runtime is reachable.
    fn when_connected<F>(&mut self, step: F) -> Vec<Effect>
    where
        F: FnOnce(&mut PathNavigator) -> Option<Command>,
    {
        if !self.connected {
            return vec![Effect::Print(WAITING_MESSAGE.to_string())];
        }
        step(&mut self.navigator)
            .map(Effect::Send)
            .into_iter()
            .collect()
    }

    fn row_path(&self, arg: &str) -> Result<String, String> {
        let tree = self.tree.as_ref().ok_or("nothing inspected yet")?;
        let number: usize = arg
            .parse()
            .map_err(|_| format!("usage: :open <n>, got {arg:?}"))?;
        tree.row(number)
            .map(|row| row.path.clone())
            .ok_or_else(|| format!("no row {number}"))
    }

    fn stage_run(&mut self, arg: &str) -> Vec<Effect> {
        let Some(tree) = self.tree.as_ref() else {
            return vec![Effect::Print("nothing inspected yet".to_string())];
        };
        let Ok(number) = arg.parse::<usize>() else {
            return vec![Effect::Print(format!("usage: :run <n>, got {arg:?}"))];
        };
        let run = match tree.row(number).map(|row| &row.detail) {
            Some(Detail::Method(method)) => method.run.clone(),
            Some(_) => None,
            None => return vec![Effect::Print(format!("no row {number}"))],
        };
        match run {
            Some(expr) => {
                let message = format!("staged: {expr} (blank line to run)");
                self.block = vec![expr];
                vec![Effect::Print(message)]
            }
            None => vec![Effect::Print(format!("row {number} is not runnable"))],
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        match event {
            ServerEvent::PythonStatus(connected) => {
                if connected == self.connected {
                    return Vec::new();
                }
                self.connected = connected;
                let message = if connected {
                    "Python connected"
                } else {
                    WAITING_MESSAGE
                };
                vec![Effect::Print(message.to_string())]
            }
            ServerEvent::Output(data) => {
                vec![Effect::Print(data.trim_end_matches('\n').to_string())]
            }
            ServerEvent::Error(error) => vec![Effect::Print(format!("Error: {error}"))],
            ServerEvent::Success(payload) => vec![Effect::Print(payload.message)],
            ServerEvent::InspectResult(message) => match InspectionNode::from_message(&message) {
                Ok(node) => {
                    let path = self.navigator.current().unwrap_or_default();
                    let tree = render_tree(&node, path);
                    let text = tree.to_text();
                    self.tree = Some(tree);
                    vec![Effect::Print(text.trim_end().to_string())]
                }
                Err(e) => vec![Effect::Print(format!("Error: {e}"))],
            },
        }
    }
}
