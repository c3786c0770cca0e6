use anyhow::{anyhow, Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io::Write;
use std::process::{Command, Stdio};

pub const DEFAULT_SUBJECT: &str = "Summer 2026 Internship & Coffee Chat Request";

pub const ATTACH_REMINDER: &str =
    "Draft opened! Please remember to manually attach your resume PDF in the email client.";

/// Everything except RFC 3986 unreserved characters gets escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn mailto_url(recipient: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        recipient,
        utf8_percent_encode(subject, COMPONENT),
        utf8_percent_encode(body, COMPONENT)
    )
}

/// Hand a URL to the platform's default handler.
pub fn open_url(url: &str) -> Result<()> {
    open::that(url).context("Failed to launch the default mail handler")
}

pub fn compose(recipient: &str, subject: &str, body: &str) -> Result<()> {
    let url = mailto_url(recipient, subject, body);
    tracing::debug!(recipient, url_len = url.len(), "opening mail handler");
    open_url(&url)
}

const CLIPBOARD_TOOLS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
    ("clip", &[]),
];

/// Copy text verbatim through the first clipboard tool that runs.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    for (program, args) in CLIPBOARD_TOOLS {
        let child = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let Ok(mut child) = child else { continue };

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("Failed to write to {}", program))?;
        }

        let status = child.wait()?;
        if status.success() {
            tracing::debug!(tool = *program, chars = text.len(), "copied to clipboard");
            return Ok(());
        }
    }

    Err(anyhow!(
        "No clipboard tool found. Install one of: pbcopy, wl-copy, xclip, xsel"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailto_url_encodes_subject_and_body() {
        let url = mailto_url("mary@acme.com", DEFAULT_SUBJECT, "Hi Mary,\nCoffee? 15 min & done.");
        assert_eq!(
            url,
            "mailto:mary@acme.com?subject=Summer%202026%20Internship%20%26%20Coffee%20Chat%20Request\
             &body=Hi%20Mary%2C%0ACoffee%3F%2015%20min%20%26%20done."
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_open_url_hands_whole_mailto_to_handler() {
        let url = mailto_url("mary@acme.com", DEFAULT_SUBJECT, "Hi Mary & team");
        let commands = open::commands(&url);
        assert!(!commands.is_empty());
        assert!(commands
            .iter()
            .all(|c| c.get_args().any(|arg| arg == std::ffi::OsStr::new(&url))));
    }

    #[test]
    fn test_mailto_url_encodes_unicode() {
        let url = mailto_url("a@b.com", "Hé", "");
        assert_eq!(url, "mailto:a@b.com?subject=H%C3%A9&body=");
    }
}
