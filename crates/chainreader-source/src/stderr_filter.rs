//! Filtering of the node's diagnostic stream before it is forwarded.

use std::borrow::Cow;

use chainreader_core::ConfigError;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// CSI escape sequences (colors, cursor movement).
const ANSI_PATTERN: &str = r"\x1b\[[0-9;?]*[ -/]*[@-~]";

/// Strips ANSI escapes, then drops lines matching an optional expression.
#[derive(Debug, Clone)]
pub struct StderrFilter {
    ansi: Regex,
    drop: Option<Regex>,
}

impl StderrFilter {
    /// `expr` is matched against the escape-free line; an empty expression
    /// disables dropping.
    pub fn new(expr: Option<&str>) -> Result<Self, ConfigError> {
        let ansi = Regex::new(ANSI_PATTERN).map_err(|e| ConfigError::InvalidPattern {
            pattern: ANSI_PATTERN.into(),
            reason: e.to_string(),
        })?;
        let drop = match expr.filter(|e| !e.is_empty()) {
            Some(expr) => Some(Regex::new(expr).map_err(|e| ConfigError::InvalidPattern {
                pattern: expr.into(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        Ok(Self { ansi, drop })
    }

    /// The line to forward, or `None` when it must be dropped.
    pub fn apply<'a>(&self, line: &'a str) -> Option<Cow<'a, str>> {
        let clean = self.ansi.replace_all(line, "");
        match &self.drop {
            Some(re) if re.is_match(&clean) => None,
            _ => Some(clean),
        }
    }
}

/// Copy `input` to `output` line by line through `filter`.
///
/// Returns the number of lines forwarded.
pub async fn forward_filtered<R, W>(input: R, mut output: W, filter: &StderrFilter) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    let mut forwarded = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            output.flush().await?;
            return Ok(forwarded);
        }
        let raw = String::from_utf8_lossy(&buf);
        if let Some(line) = filter.apply(&raw) {
            output.write_all(line.as_bytes()).await?;
            forwarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let filter = StderrFilter::new(None).unwrap();
        let line = "\x1b[90m12:00PM\x1b[0m \x1b[32mINF\x1b[0m committed state";
        assert_eq!(filter.apply(line).unwrap(), "12:00PM INF committed state");
    }

    #[test]
    fn drops_matching_lines_after_stripping() {
        let filter = StderrFilter::new(Some(r"module=(p2p|pex)")).unwrap();
        assert!(filter.apply("INF dialing peer module=p2p").is_none());
        assert!(filter.apply("INF \x1b[36mmodule=\x1b[0mpex addr book").is_none());
        assert_eq!(
            filter.apply("INF executed block module=state").unwrap(),
            "INF executed block module=state"
        );
    }

    #[test]
    fn empty_expression_keeps_everything() {
        let filter = StderrFilter::new(Some("")).unwrap();
        assert!(filter.apply("anything").is_some());
    }

    #[test]
    fn invalid_expression_is_config_error() {
        let err = StderrFilter::new(Some("(unclosed")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn forwards_filtered_stream() {
        let filter = StderrFilter::new(Some("noise")).unwrap();
        let input = b"keep 1\nnoise here\n\x1b[1mkeep 2\x1b[0m\n".as_slice();
        let mut out = Vec::new();
        let n = forward_filtered(input, &mut out, &filter).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "keep 1\nkeep 2\n");
    }
}
