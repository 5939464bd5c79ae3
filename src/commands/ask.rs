use std::io::Write;

use anyhow::Result;

use super::{Session, SessionOptions, with_timeout};
use crate::display::renderer::Renderer;
use crate::prompt;

/// Send one message, print aider's reply, and stop.
///
/// Returns the session cost reported by aider.
pub async fn ask<W: Write>(opts: SessionOptions, message: &str, writer: W) -> Result<f64> {
    let session = Session::start(&opts).await?;
    let mut renderer = Renderer::with_writer(writer);

    let reply = with_timeout(session.timeout, session.aider.send_and_wait(message)).await?;
    renderer.render_output(prompt::strip_input_prompt(&reply));
    let cost = session.aider.cost();
    if cost > 0.0 {
        renderer.render_cost(cost);
    }
    session.shutdown().await?;
    Ok(cost)
}
