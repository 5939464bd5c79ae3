use std::io::{BufRead, Write};

use anyhow::Result;
use futures::{FutureExt, StreamExt};

use super::{Session, SessionOptions, is_terminated, with_timeout};
use crate::display::renderer::Renderer;
use crate::prompt::{self, PromptKind};
use crate::session::buffer::Utf8Decoder;

/// Run an interactive session: each input line is sent to aider and its
/// output is streamed back until the next prompt.
///
/// Ends when `input` is exhausted or aider exits. Returns the session cost.
pub async fn run<R: BufRead, W: Write>(opts: SessionOptions, input: &mut R, writer: W) -> Result<f64> {
    let session = Session::start(&opts).await?;
    let aider = &session.aider;
    let mut renderer = Renderer::with_writer(writer);

    renderer.render_session_header(aider.working_dir(), &aider.command_line());
    renderer.render_files(&aider.read_only_files(), &aider.editable_files());
    let mode = match aider.state().last_prompt {
        Some(PromptKind::Input { mode }) => mode,
        _ => None,
    };
    renderer.render_output(&prompt::input_prompt(mode.as_deref()));

    let mut failure = None;
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim_end_matches(['\n', '\r']);

        let Ok(mut stream) = aider.output_stream() else {
            renderer.render_warning("aider exited");
            break;
        };

        let mut decoder = Utf8Decoder::new();
        let wait = with_timeout(session.timeout, aider.send_and_wait(message));
        tokio::pin!(wait);
        let result = loop {
            tokio::select! {
                biased;
                Some(chunk) = stream.next() => renderer.render_chunk(&decoder.decode(&chunk)),
                result = &mut wait => break result,
            }
        };
        // Chunks of the final segment may still be queued on the stream.
        while let Some(Some(chunk)) = stream.next().now_or_never() {
            renderer.render_chunk(&decoder.decode(&chunk));
        }
        renderer.render_chunk(&decoder.finish());

        match result {
            Ok(_) => {
                let cost = aider.cost();
                if cost > 0.0 {
                    renderer.render_cost(cost);
                }
            }
            Err(e) if is_terminated(&e) => {
                renderer.render_warning("aider exited");
                break;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let cost = aider.cost();
    let shutdown = session.shutdown().await;
    if let Some(e) = failure {
        return Err(e);
    }
    shutdown?;
    Ok(cost)
}
