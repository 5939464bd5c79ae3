#![allow(clippy::expect_used)]

use std::path::Path;

use aider_driver::transcript::{TestCase, Transcript};
use aider_driver::{AiderProcess, PromptKind, prompt};

// --- Transcript validation ---

fn load_case(name: &str) -> (TestCase, Transcript) {
    let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/cases");
    let case: TestCase = toml::from_str(
        &std::fs::read_to_string(base.join(format!("{name}.toml")))
            .expect("Failed to read TOML file"),
    )
    .expect("Failed to parse TOML file");
    let transcript = Transcript::load(&base.join(format!("{name}.vcr"))).expect("Failed to load VCR");
    (case, transcript)
}

/// Check the recording was made from this test case definition.
fn validate_transcript(case: &TestCase, transcript: &Transcript) {
    assert_eq!(transcript.header.vcr, "header");
    assert_eq!(
        transcript.header.command,
        case.expected_command(),
        "VCR header command mismatch"
    );
    assert_eq!(
        transcript.inputs(),
        case.messages.iter().map(String::as_str).collect::<Vec<_>>(),
        "VCR stdin lines don't match TOML messages"
    );
}

// --- Transcript replay ---

/// Everything a replayed session produced, minus the raw chatter.
#[derive(Debug)]
#[allow(dead_code)]
struct Replayed {
    read_only: Vec<String>,
    editable: Vec<String>,
    prompts: Vec<Option<PromptKind>>,
    cost: f64,
}

/// Replay a recorded case, sending each message and collecting the replies.
async fn replay_case(name: &str) -> (Replayed, Vec<String>) {
    let (case, transcript) = load_case(name);
    validate_transcript(&case, &transcript);

    let (aider, replay) = transcript
        .replay(case.start_options(Path::new("/tmp/proj")))
        .await
        .expect("replay should start");

    let mut replies = Vec::new();
    for message in &case.messages {
        replies.push(
            aider
                .send_and_wait(message.as_str())
                .await
                .expect("reply should end in a prompt"),
        );
    }
    let replayed = summarize(&aider, &replies);

    drop(aider);
    replay.finish().await.expect("replay should match the recording");
    (replayed, replies)
}

fn summarize(aider: &AiderProcess, replies: &[String]) -> Replayed {
    Replayed {
        read_only: aider.read_only_files().into_iter().collect(),
        editable: aider.editable_files().into_iter().collect(),
        prompts: replies.iter().map(|r| prompt::classify(r)).collect(),
        cost: aider.cost(),
    }
}

#[tokio::test]
async fn help() {
    let (replayed, replies) = replay_case("help").await;
    insta::assert_debug_snapshot!(replayed, @r#"
    Replayed {
        read_only: [
            "docs/guidelines.md",
        ],
        editable: [
            "docs/plan.md",
        ],
        prompts: [
            Some(
                Input {
                    mode: Some(
                        "architect",
                    ),
                },
            ),
        ],
        cost: 0.0,
    }
    "#);
    assert!(replies[0].contains("Use `/help <question>` to ask questions about how to use aider."));
    assert!(replies[0].ends_with("\narchitect> "));
}

#[tokio::test]
async fn cost() {
    let (replayed, replies) = replay_case("cost").await;
    assert_eq!(replayed.editable, ["notes.md"]);
    assert!(replayed.read_only.is_empty());
    assert!((replayed.cost - 0.02).abs() < f64::EPSILON);
    insta::assert_snapshot!(prompt::strip_input_prompt(&replies[1]).trim_end(), @r"
    Chores.

    Tokens: 2.5k sent, 3 received. Cost: $0.0077 message, $0.02 session.

    notes.md
    ");
}

#[tokio::test]
async fn confirm_add() {
    let (replayed, replies) = replay_case("confirm_add").await;
    insta::assert_debug_snapshot!(replayed, @r"
    Replayed {
        read_only: [],
        editable: [],
        prompts: [
            Some(
                Confirm,
            ),
            Some(
                Input {
                    mode: None,
                },
            ),
        ],
        cost: 0.02,
    }
    ");
    assert!(replies[0].ends_with("(D)on't ask again [Yes]: "));
    assert!(replies[1].contains("Applied edit to notes.md"));
}

/// The cost after the first reply is the first report, not a later one.
#[tokio::test]
async fn cost_tracks_each_reply() {
    let (case, transcript) = load_case("cost");
    let (aider, replay) = transcript
        .replay(case.start_options(Path::new("/tmp/proj")))
        .await
        .expect("replay should start");

    aider
        .send_and_wait(case.messages[0].as_str())
        .await
        .expect("first reply");
    assert!((aider.cost() - 0.0081).abs() < f64::EPSILON);
    aider
        .send_and_wait(case.messages[1].as_str())
        .await
        .expect("second reply");
    assert!((aider.cost() - 0.02).abs() < f64::EPSILON);
    assert_eq!(aider.state().prompts_seen, 3);

    drop(aider);
    replay.finish().await.expect("replay should match the recording");
}

/// Replayed stdout concatenates to what the live session printed.
#[tokio::test]
async fn replies_cover_all_output() {
    let (case, transcript) = load_case("help");
    let (aider, replay) = transcript
        .replay(case.start_options(Path::new("/tmp/proj")))
        .await
        .expect("replay should start");
    let reply = aider.send_and_wait("/help").await.expect("reply");
    drop(aider);
    replay.finish().await.expect("replay should match the recording");

    let output = transcript.output();
    assert!(output.ends_with(&reply));
    assert!(output.starts_with("Aider v0.86.1\n"));
}
