use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

/// DevTools browser endpoint announced on one line of Chromium's stderr.
pub fn parse_devtools_line(line: &str) -> Option<&str> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then_some(ws)
}

/// Read Chromium stderr until the DevTools websocket URL shows up.
pub async fn extract_ws_url(child: &mut Child, wait: Duration) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = parse_devtools_line(&line) {
                return Ok(ws.to_string());
            }
            if preview.len() < 8 {
                preview.push(line);
            }
        }
        Err(anyhow!(
            "chromium exited before exposing its devtools url; stderr: {}",
            preview.join(" | ")
        ))
    };

    timeout(wait, reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools url"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_browser_endpoint_from_stderr() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc-123";
        assert_eq!(
            parse_devtools_line(line),
            Some("ws://127.0.0.1:9222/devtools/browser/abc-123")
        );
        assert_eq!(parse_devtools_line("[0101/000000.0:ERROR] gpu"), None);
        assert_eq!(
            parse_devtools_line("listening on ws://127.0.0.1:9222/devtools/page/1"),
            None
        );
    }
}
