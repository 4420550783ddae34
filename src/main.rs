//! Binary entrypoint that launches the chat server.

use std::process::ExitCode;

use uncorp_chat::start_uncorp_chat;

/// Start the HTTP server with configuration from the environment.
fn main() -> ExitCode {
    start_uncorp_chat::run()
}
