//! Client side of pylens: path navigation, tree rendering and a terminal
//! console that talks to the relay as one more session.

pub mod connection;
pub mod console;
pub mod error;
pub mod navigator;
pub mod tree;

pub use connection::{CommandSink, EventStream, connect};
pub use console::{Console, Effect};
pub use error::ClientError;
pub use navigator::{PathHistory, PathNavigator, child_path, is_identifier};
pub use tree::{RenderedTree, Row, render_tree};
