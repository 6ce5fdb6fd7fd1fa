//! Single-video detail fetch.
//!
//! Shares the retry policy and network layer with the search executor.
//! Errors come back as [`DetailError`], which callers surface directly and
//! never retry.

use std::sync::Arc;

use vidseek_core::network::fetch_with_retry;
use vidseek_core::{NetworkLayer, RetryPolicy, SourceDescriptor};

use crate::errors::DetailError;
use crate::normalize::normalize_detail;
use crate::types::{Episode, VideoDetail};

const GROUP_SEPARATOR: &str = "$$$";
const EPISODE_SEPARATOR: char = '#';
const NAME_SEPARATOR: char = '$';
const PREFERRED_GROUP_MARKER: &str = "m3u8";

/// Fetches full information for one video from one source.
#[derive(Clone)]
pub struct DetailFetcher {
    network: Arc<dyn NetworkLayer>,
    policy: RetryPolicy,
}

impl DetailFetcher {
    pub fn new(network: Arc<dyn NetworkLayer>, policy: RetryPolicy) -> Self {
        Self { network, policy }
    }

    /// Fetches the detail of `video_id` from `source`.
    ///
    /// # Errors
    ///
    /// - `DetailError::NotFound` - Upstream answered 404 or an empty list
    /// - `DetailError::Failed` - Any other failure after the retry budget
    pub async fn fetch_detail(
        &self,
        source: &SourceDescriptor,
        video_id: &str,
    ) -> Result<VideoDetail, DetailError> {
        let url = source.detail_url(video_id);
        let not_found = || DetailError::NotFound {
            source_id: source.id.clone(),
            video_id: video_id.to_string(),
        };

        let settled = fetch_with_retry(&*self.network, &self.policy, &url, &source.headers)
            .await
            .map_err(|exhausted| {
                let status = exhausted.last.failure().and_then(|e| e.status_code());
                tracing::warn!(
                    source = %source.id,
                    video_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last,
                    "Detail fetch failed"
                );
                if status == Some(404) {
                    not_found()
                } else {
                    DetailError::Failed {
                        source_id: source.id.clone(),
                        reason: exhausted.to_string(),
                    }
                }
            })?;

        let latency_ms = settled.latency.as_millis() as u64;
        let payload = normalize_detail(&source.id, video_id, &settled.value.body, latency_ms)
            .map_err(|e| DetailError::Failed {
                source_id: source.id.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(not_found)?;

        let available_groups = split_groups(&payload.play_from)
            .into_iter()
            .map(str::to_string)
            .collect();
        let (play_group, episodes) =
            match select_play_group(&payload.play_from, &payload.play_url) {
                Some((code, blob)) => (code, parse_episodes(blob)),
                None => (None, Vec::new()),
            };

        tracing::debug!(
            source = %source.id,
            video_id,
            episodes = episodes.len(),
            latency_ms,
            "Detail fetched"
        );

        Ok(VideoDetail {
            video: payload.video,
            play_group,
            available_groups,
            episodes,
        })
    }
}

fn split_groups(blob: &str) -> Vec<&str> {
    if blob.trim().is_empty() {
        return Vec::new();
    }
    blob.split(GROUP_SEPARATOR).map(str::trim).collect()
}

/// Picks the play group to use: the first one whose code mentions `m3u8`,
/// otherwise the first one.
///
/// Returns the group code (if the source named its groups) and the raw
/// episode blob of that group, or `None` if there are no play urls.
pub fn select_play_group<'a>(
    play_from: &'a str,
    play_url: &'a str,
) -> Option<(Option<String>, &'a str)> {
    let urls = split_groups(play_url);
    if urls.is_empty() {
        return None;
    }
    let codes = split_groups(play_from);

    let index = codes
        .iter()
        .take(urls.len())
        .position(|code| code.to_lowercase().contains(PREFERRED_GROUP_MARKER))
        .unwrap_or(0);

    let code = codes
        .get(index)
        .filter(|code| !code.is_empty())
        .map(|code| code.to_string());
    Some((code, urls[index]))
}

/// Parses `#`-delimited `name$url` pairs; a bare url is named `Episode N`.
pub fn parse_episodes(blob: &str) -> Vec<Episode> {
    blob.split(EPISODE_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .filter_map(|(index, entry)| {
            let (name, url) = match entry.split_once(NAME_SEPARATOR) {
                Some((name, url)) => (name.trim(), url.trim()),
                None => ("", entry),
            };
            if url.is_empty() {
                return None;
            }
            let name = if name.is_empty() {
                format!("Episode {}", index + 1)
            } else {
                name.to_string()
            };
            Some(Episode {
                name,
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vidseek_core::RetryStrategy;
    use vidseek_core::network::{ScriptedNetworkLayer, ScriptedReply};

    use super::*;

    fn fetcher(layer: Arc<ScriptedNetworkLayer>) -> DetailFetcher {
        DetailFetcher::new(
            layer,
            RetryPolicy {
                attempt_timeout: Duration::from_millis(300),
                max_retries: 1,
                strategy: RetryStrategy::Immediate,
            },
        )
    }

    #[test]
    fn test_prefers_m3u8_group() {
        let (code, blob) =
            select_play_group("web$$$dplayer_m3u8", "E1$http://w/1$$$E1$http://m/1.m3u8").unwrap();

        assert_eq!(code.as_deref(), Some("dplayer_m3u8"));
        assert_eq!(blob, "E1$http://m/1.m3u8");
    }

    #[test]
    fn test_falls_back_to_first_group() {
        let (code, blob) = select_play_group("a$$$b", "x$1$$$y$2").unwrap();

        assert_eq!(code.as_deref(), Some("a"));
        assert_eq!(blob, "x$1");
        assert!(select_play_group("a", "").is_none());
    }

    #[test]
    fn test_parse_episodes_names_bare_urls() {
        let episodes = parse_episodes("Pilot$http://e/1#http://e/2##Finale$http://e/3#Broken$");

        assert_eq!(
            episodes,
            vec![
                Episode {
                    name: "Pilot".to_string(),
                    url: "http://e/1".to_string()
                },
                Episode {
                    name: "Episode 2".to_string(),
                    url: "http://e/2".to_string()
                },
                Episode {
                    name: "Finale".to_string(),
                    url: "http://e/3".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_detail_builds_episode_list() {
        let layer = Arc::new(ScriptedNetworkLayer::new());
        layer.script(
            "ids=7",
            vec![ScriptedReply::json(
                r#"{"code":1,"list":[{"vod_id":7,"vod_name":"Show",
                    "vod_play_from":"web$$$hls_m3u8",
                    "vod_play_url":"E1$http://w/1$$$E1$http://h/1.m3u8#E2$http://h/2.m3u8"}]}"#,
            )],
        );
        let source = SourceDescriptor::new("a", "http://a.example");

        let detail = fetcher(layer).fetch_detail(&source, "7").await.unwrap();

        assert_eq!(detail.video.title, "Show");
        assert_eq!(detail.play_group.as_deref(), Some("hls_m3u8"));
        assert_eq!(detail.available_groups, vec!["web", "hls_m3u8"]);
        assert_eq!(detail.episodes.len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_for_404_and_empty_list() {
        let layer = Arc::new(ScriptedNetworkLayer::new());
        layer.script("ids=gone", vec![ScriptedReply::status(404)]);
        layer.script("ids=empty", vec![ScriptedReply::json(r#"{"code":1,"list":[]}"#)]);
        let source = SourceDescriptor::new("a", "http://a.example");
        let fetcher = fetcher(layer.clone());

        let gone = fetcher.fetch_detail(&source, "gone").await.unwrap_err();
        let empty = fetcher.fetch_detail(&source, "empty").await.unwrap_err();

        assert!(gone.is_not_found());
        assert!(empty.is_not_found());
        assert_eq!(gone.kind(), "DETAIL_FAILED");
        assert_eq!(layer.request_count("ids=gone"), 1);
    }

    #[tokio::test]
    async fn test_not_found_when_upstream_returns_other_title() {
        let layer = Arc::new(ScriptedNetworkLayer::new());
        layer.script(
            "ids=42",
            vec![ScriptedReply::json(
                r#"{"code":1,"list":[{"vod_id":7,"vod_name":"Some Other Show",
                    "vod_play_from":"hls_m3u8","vod_play_url":"E1$http://h/1.m3u8"}]}"#,
            )],
        );
        let source = SourceDescriptor::new("a", "http://a.example");

        let err = fetcher(layer).fetch_detail(&source, "42").await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_server_error_is_failed_after_retry() {
        let layer = Arc::new(ScriptedNetworkLayer::new());
        layer.script("ids=1", vec![ScriptedReply::status(503)]);
        let source = SourceDescriptor::new("a", "http://a.example");

        let err = fetcher(layer.clone())
            .fetch_detail(&source, "1")
            .await
            .unwrap_err();

        assert!(matches!(err, DetailError::Failed { .. }));
        assert_eq!(layer.request_count("ids=1"), 2);
    }
}
