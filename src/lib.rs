mod app;
mod hostlist;
mod input;
mod logpane;
mod runcmd;
mod sshconfig;
pub mod syscmd;
mod terminal;
mod watcher;

pub use app::{App, AppOptions};
pub use sshconfig::*;
pub use syscmd::Client;
pub use terminal::Terminal;
