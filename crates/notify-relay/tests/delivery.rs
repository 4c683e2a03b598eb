use async_trait::async_trait;
use notify_relay::{
    ChannelId, DeliveryError, DeliveryOutcome, DeliveryProvider, MessageBody, Notifier,
    NotifierConfig, ProviderResponse, RateLimiter, TextFormat, ThrottleClass, ThrottleConfig,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Call {
    channel: String,
    body: String,
    at: Instant,
}

/// Replays canned responses, then answers `ok`
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResponse>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    fn with_script(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
            calls: Mutex::default(),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, channel: &ChannelId, body: String) -> ProviderResponse {
        self.calls.lock().unwrap().push(Call {
            channel: channel.to_string(),
            body,
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ProviderResponse::ok)
    }
}

#[async_trait]
impl DeliveryProvider for ScriptedProvider {
    async fn send_text(
        &self,
        channel: &ChannelId,
        text: &str,
        _format: TextFormat,
    ) -> ProviderResponse {
        self.next(channel, text.to_string())
    }

    async fn send_file(
        &self,
        channel: &ChannelId,
        path: &Path,
        caption: Option<&str>,
        _format: TextFormat,
    ) -> ProviderResponse {
        self.next(
            channel,
            format!("{}|{}", path.display(), caption.unwrap_or_default()),
        )
    }
}

fn log() -> ChannelId {
    ChannelId::new("log-chat")
}

#[tokio::test(start_paused = true)]
async fn rate_limited_then_ok_honours_retry_after() {
    let provider = ScriptedProvider::with_script(vec![ProviderResponse::rate_limited(Some(
        Duration::from_secs(2),
    ))]);
    let notifier = Notifier::new(provider.clone(), NotifierConfig::default());

    let started = Instant::now();
    let receipt = notifier
        .send(MessageBody::html("<b>hello</b>"), &log())
        .await
        .unwrap();

    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.outcome(), DeliveryOutcome::Success);
    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(2));
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_use_fixed_backoff_and_cap_attempts() {
    let provider = ScriptedProvider::with_script(vec![
        ProviderResponse::server_error(502, "Bad Gateway"),
        ProviderResponse::network_error("connection reset"),
        ProviderResponse::server_error(503, "Unavailable"),
    ]);
    let notifier = Notifier::new(provider.clone(), NotifierConfig::default());

    let err = notifier
        .send(MessageBody::plain("status"), &log())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Transient { attempts: 3, .. }));
    assert_eq!(err.outcome(), DeliveryOutcome::TransientError);
    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(5));
    assert_eq!(calls[2].at - calls[1].at, Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limit_is_reported() {
    let provider = ScriptedProvider::with_script(vec![
        ProviderResponse::rate_limited(Some(Duration::from_secs(1))),
        ProviderResponse::rate_limited(None),
        ProviderResponse::rate_limited(Some(Duration::from_secs(1))),
    ]);
    let notifier = Notifier::new(provider.clone(), NotifierConfig::default());

    let err = notifier.send(MessageBody::plain("x"), &log()).await.unwrap_err();
    assert_eq!(err.outcome(), DeliveryOutcome::RateLimited);
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let provider = ScriptedProvider::with_script(vec![ProviderResponse::client_error(
        Some(400),
        "Bad Request: chat not found",
    )]);
    let notifier = Notifier::new(provider.clone(), NotifierConfig::default());

    let err = notifier.send(MessageBody::plain("x"), &log()).await.unwrap_err();
    assert_eq!(err.outcome(), DeliveryOutcome::PermanentError);
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn oversized_text_and_caption_are_truncated() {
    let provider = ScriptedProvider::with_script(vec![]);
    let notifier = Notifier::new(provider.clone(), NotifierConfig::default());

    notifier
        .send(MessageBody::plain("x".repeat(10_000)), &log())
        .await
        .unwrap();
    notifier
        .send(
            MessageBody::file("/tmp/spin.json", Some("c".repeat(2_000))),
            &ChannelId::new("files"),
        )
        .await
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls[0].body.len(), 4_000);
    assert!(calls[0].body.ends_with("..."));
    let caption = calls[1].body.split('|').nth(1).unwrap();
    assert_eq!(caption.len(), 1_024);
    assert_eq!(calls[1].channel, "files");
}

#[tokio::test(start_paused = true)]
async fn concurrent_senders_share_spacing() {
    let provider = ScriptedProvider::with_script(vec![]);
    let notifier = Arc::new(Notifier::new(provider.clone(), NotifierConfig::default()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let notifier = notifier.clone();
        handles.push(tokio::spawn(async move {
            notifier
                .send(MessageBody::plain(format!("msg {i}")), &log())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let calls = provider.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(2));
    }
}

/// Deterministic pseudo-random sequence (64-bit LCG)
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[tokio::test(start_paused = true)]
async fn limiter_spacing_holds_for_arbitrary_sequences() {
    let config = ThrottleConfig::default();
    let channels = [
        ChannelId::new("a"),
        ChannelId::new("b"),
        ChannelId::new("c"),
    ];

    for seed in 0..20u64 {
        let limiter = RateLimiter::new(config.clone());
        let mut rng = Lcg(seed);
        let mut grants: Vec<(usize, ThrottleClass, Instant)> = Vec::new();

        for _ in 0..25 {
            let idle = Duration::from_millis(rng.next() % 3_000);
            tokio::time::sleep(idle).await;
            let channel = (rng.next() % 3) as usize;
            let class = if rng.next() % 4 == 0 {
                ThrottleClass::File
            } else {
                ThrottleClass::Text
            };
            limiter.acquire(&channels[channel], class).await;
            grants.push((channel, class, Instant::now()));
        }

        for (i, (channel, class, at)) in grants.iter().enumerate() {
            if i > 0 {
                let gap = *at - grants[i - 1].2;
                assert!(gap >= Duration::from_millis(config.global_interval_ms));
            }
            let previous_same = grants[..i].iter().rev().find(|g| g.0 == *channel);
            if let Some(prev) = previous_same {
                assert!(*at - prev.2 >= Duration::from_millis(config.channel_interval_ms));
            }
            if *class == ThrottleClass::File {
                let previous_file = grants[..i]
                    .iter()
                    .rev()
                    .find(|g| g.0 == *channel && g.1 == ThrottleClass::File);
                if let Some(prev) = previous_file {
                    assert!(*at - prev.2 >= Duration::from_millis(config.file_interval_ms));
                }
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn limiter_grants_in_submission_order() {
    let limiter = Arc::new(RateLimiter::new(ThrottleConfig::default()));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let limiter = limiter.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .acquire(&ChannelId::new("shared"), ThrottleClass::Text)
                .await;
            order.lock().unwrap().push(i);
        }));
        tokio::task::yield_now().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn retries_queue_behind_other_senders() {
    let provider =
        ScriptedProvider::with_script(vec![ProviderResponse::server_error(502, "Bad Gateway")]);
    let notifier = Arc::new(Notifier::new(provider.clone(), NotifierConfig::default()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let notifier = notifier.clone();
        handles.push(tokio::spawn(async move {
            notifier.send_html(format!("msg {i}"), &log()).await
        }));
        tokio::task::yield_now().await;
    }
    let mut receipts = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap().unwrap());
    }

    let calls = provider.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(
            pair[1].at - pair[0].at >= Duration::from_secs(2),
            "same-channel gap {:?}",
            pair[1].at - pair[0].at
        );
    }

    // msg 0 failed at 0s, backed off to 5s, then waited for the slot after msg 2 (4s)
    assert_eq!(calls[3].body, "msg 0");
    assert_eq!(calls[3].at - calls[0].at, Duration::from_secs(6));
    assert_eq!(receipts[0].attempts, 2);
    assert_eq!(receipts[0].throttled, Duration::from_secs(1));
}
