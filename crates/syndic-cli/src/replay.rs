use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use syndic_core::{Pipeline, PipelineReporter, PipelineRun, RawExchange};
use tokio::sync::mpsc;

/// Exchanges buffered between the file reader and the pipeline.
const CHANNEL_CAPACITY: usize = 64;

/// Replay a JSON-lines capture file through the pipeline.
///
/// The file is read on a blocking thread and fed through a bounded channel,
/// the same way a live browsing session would deliver exchanges.
pub async fn replay<R>(path: &Path, pipeline: Pipeline<R>) -> Result<PipelineRun>
where
    R: PipelineReporter + 'static,
{
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let source = path.to_path_buf();
    let reader = tokio::task::spawn_blocking(move || feed(&source, BufReader::new(file), tx));

    let run = pipeline.run(rx).await;
    let sent = reader.await.context("Capture reader panicked")??;
    tracing::info!(sent, exchanges_seen = run.exchanges_seen, "Replay finished");
    Ok(run)
}

/// Send every parseable line to `tx`. Stops early once the receiver is gone,
/// which happens when the run is blocked or the collection target is hit.
fn feed<B: BufRead>(source: &Path, input: B, tx: mpsc::Sender<RawExchange>) -> Result<usize> {
    let mut sent = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", source.display()))?;
        let Some(exchange) = parse_line(&line, index + 1) else {
            continue;
        };
        if tx.blocking_send(exchange).is_err() {
            tracing::debug!(line = index + 1, "Pipeline stopped accepting exchanges");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

fn parse_line(line: &str, line_no: usize) -> Option<RawExchange> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(exchange) => Some(exchange),
        Err(e) => {
            tracing::warn!(line = line_no, error = %e, "Skipping malformed exchange");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use syndic_core::config::PipelineConfig;
    use syndic_core::pipeline::PipelineParts;
    use syndic_core::registry::AdapterRegistry;
    use syndic_core::{BlockReason, Origin, RunOutcome};
    use tempfile::NamedTempFile;

    const LISTING_URL: &str =
        "https://www.linkedin.com/voyager/api/voyagerJobsDashJobCards?q=jobSearch";

    fn listing_line(ids: &[&str]) -> String {
        let jobs: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "entityUrn": format!("urn:li:fsd_jobPosting:{id}"),
                    "title": "Data Engineer",
                    "companyDetails": {"company": {"name": "Globex"}},
                })
            })
            .collect();
        serde_json::json!({
            "url": LISTING_URL,
            "status": 200,
            "content_type": "application/json",
            "body": serde_json::json!({"included": jobs}).to_string(),
        })
        .to_string()
    }

    fn capture(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        let parts = PipelineParts::linkedin(AdapterRegistry::new()).unwrap();
        Pipeline::new(config, parts).unwrap()
    }

    #[test]
    fn test_parse_line_skips_blank_and_malformed() {
        assert!(parse_line("   ", 1).is_none());
        assert!(parse_line("{not json", 2).is_none());
        let exchange = parse_line(r#"{"url": "https://example.com", "status": 204}"#, 3).unwrap();
        assert_eq!(exchange.status, 204);
        assert!(exchange.body.is_empty());
    }

    #[tokio::test]
    async fn test_replay_collects_native_candidates() {
        let file = capture(&[
            listing_line(&["1", "2"]),
            String::new(),
            "garbage".to_string(),
            listing_line(&["2", "3"]),
        ]);

        let run = replay(file.path(), pipeline(PipelineConfig::default()))
            .await
            .unwrap();

        assert_eq!(run.exchanges_seen, 2);
        assert_eq!(run.candidates.len(), 3);
        assert!(
            run.candidates
                .iter()
                .all(|c| c.origin == Origin::PlatformNative)
        );
        assert_eq!(
            run.outcome(),
            RunOutcome::Completed {
                candidates: 3,
                errors: 0
            }
        );
    }

    #[tokio::test]
    async fn test_replay_stops_at_block() {
        let login = serde_json::json!({
            "url": "https://www.linkedin.com/feed/",
            "status": 302,
            "redirect_location": "https://www.linkedin.com/authwall?trk=x",
        })
        .to_string();
        let file = capture(&[listing_line(&["1"]), login, listing_line(&["2"])]);

        let run = replay(file.path(), pipeline(PipelineConfig::default()))
            .await
            .unwrap();

        assert!(run.is_aborted());
        assert_eq!(run.block.as_ref().unwrap().reason, BlockReason::AuthWall);
        assert_eq!(run.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_honours_collection_target() {
        let file = capture(&[listing_line(&["1", "2", "3"]), listing_line(&["4"])]);
        let config = PipelineConfig {
            max_candidates: Some(2),
            ..PipelineConfig::default()
        };

        let run = replay(file.path(), pipeline(config)).await.unwrap();

        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.exchanges_seen, 1);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.jsonl");
        let err = replay(&missing, pipeline(PipelineConfig::default()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
