//! Terminal display styles.
//!
//! Only named ANSI colors are used so output follows the user's terminal
//! palette. Prefer `Attribute::Dim` / `Attribute::Bold` over bright variants.

use crossterm::style::{Attribute, Color, ContentStyle};

pub fn dim() -> ContentStyle {
    ContentStyle {
        attributes: Attribute::Dim.into(),
        ..Default::default()
    }
}

pub fn read_only_file() -> ContentStyle {
    ContentStyle {
        foreground_color: Some(Color::Blue),
        ..Default::default()
    }
}

pub fn editable_file() -> ContentStyle {
    ContentStyle {
        foreground_color: Some(Color::Green),
        ..Default::default()
    }
}

pub fn error() -> ContentStyle {
    ContentStyle {
        foreground_color: Some(Color::Red),
        ..Default::default()
    }
}

pub fn cost_line() -> ContentStyle {
    ContentStyle {
        foreground_color: Some(Color::Yellow),
        attributes: Attribute::Dim.into(),
        ..Default::default()
    }
}

pub fn prompt_style() -> ContentStyle {
    ContentStyle {
        foreground_color: Some(Color::Cyan),
        attributes: Attribute::Bold.into(),
        ..Default::default()
    }
}
