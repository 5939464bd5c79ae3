use std::io::Write;

use anyhow::Result;

use super::{Session, SessionOptions};
use crate::display::renderer::Renderer;

/// Start aider, print the files it loaded into the chat, and stop it.
pub async fn files<W: Write>(opts: SessionOptions, writer: W) -> Result<()> {
    let session = Session::start(&opts).await?;
    let mut renderer = Renderer::with_writer(writer);
    renderer.render_files(
        &session.aider.read_only_files(),
        &session.aider.editable_files(),
    );
    session.shutdown().await
}
