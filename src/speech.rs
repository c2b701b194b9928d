use std::time::Duration;

use crate::logging;
use crate::settings::Settings;

/// Longest text the translate endpoint accepts in one request.
const MAX_REQUEST_CHARS: usize = 100;

/// Text-to-speech collaborator.
///
/// Synthesis never fails from the caller's point of view: an empty byte
/// vector means "no audio available".
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Vec<u8>;
}

/// Used when speech synthesis is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn synthesize(&self, _text: &str) -> Vec<u8> {
        Vec::new()
    }
}

/// Adapts a closure, e.g. a canned or offline voice.
pub struct FnSynthesizer<F>(pub F);

impl<F> SpeechSynthesizer for FnSynthesizer<F>
where
    F: Fn(&str) -> Vec<u8> + Send + Sync,
{
    fn synthesize(&self, text: &str) -> Vec<u8> {
        (self.0)(text)
    }
}

/// Bounded retry with exponential backoff: attempt `n` (1-based) that fails
/// is followed by a sleep of `base * 2^(n-1)`, except after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` until it succeeds or the attempts are used up. `op` receives
    /// the 1-based attempt number.
    pub fn run<T, E: std::fmt::Display>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Option<T> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            match op(attempt) {
                Ok(value) => return Some(value),
                Err(err) if attempt < attempts => {
                    logging::debug(format!("tts attempt {} failed: {}", attempt, err));
                    sleep(self.delay_after(attempt));
                }
                Err(err) => {
                    logging::warn(format!("tts error after {} attempts: {}", attempt, err));
                }
            }
        }
        None
    }
}

/// Google Translate speech endpoint, returns MP3 bytes.
pub struct GoogleTts {
    client: reqwest::blocking::Client,
    endpoint: String,
    language: String,
    retry: RetryPolicy,
}

impl GoogleTts {
    pub fn new(settings: &Settings) -> eyre::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.tts_timeout_secs.max(1)))
            .user_agent("Mozilla/5.0 (vocab)")
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("https://translate.google.{}/translate_tts", settings.tts_tld),
            language: settings.tts_language.clone(),
            retry: RetryPolicy {
                attempts: settings.tts_retries,
                base: Duration::from_millis(settings.tts_base_sleep_ms),
            },
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn fetch_chunk(&self, chunk: &str, index: usize, total: usize) -> eyre::Result<Vec<u8>> {
        let index = index.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.language.as_str()),
                ("q", chunk),
                ("idx", index.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()?
            .error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }

    fn fetch(&self, text: &str) -> eyre::Result<Vec<u8>> {
        let chunks = split_for_request(text, MAX_REQUEST_CHARS);
        let mut audio = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, i, chunks.len())?);
        }
        if audio.is_empty() {
            return Err(eyre::eyre!("empty response for '{}'", text));
        }
        Ok(audio)
    }
}

impl SpeechSynthesizer for GoogleTts {
    fn synthesize(&self, text: &str) -> Vec<u8> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        self.retry
            .run(|_| self.fetch(text), std::thread::sleep)
            .unwrap_or_default()
    }
}

/// Split text at whitespace into pieces of at most `max_chars` characters.
/// A single word longer than the limit is hard-split.
pub fn split_for_request(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let pending = current.chars().count();
        let extra = word.chars().count() + usize::from(pending > 0);
        if pending > 0 && pending + extra > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if word.chars().count() > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Build the synthesizer described by the settings.
pub fn from_settings(settings: &Settings) -> eyre::Result<Box<dyn SpeechSynthesizer>> {
    if !settings.tts_enabled {
        return Ok(Box::new(SilentSynthesizer));
    }
    Ok(Box::new(GoogleTts::new(settings)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            base: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_stops_on_success() {
        let policy = RetryPolicy::default();
        let mut sleeps = Vec::new();
        let result = policy.run(
            |attempt| if attempt < 2 { Err("busy") } else { Ok(attempt) },
            |d| sleeps.push(d),
        );
        assert_eq!(result, Some(2));
        assert_eq!(sleeps, vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_retry_exhaustion_returns_none() {
        let policy = RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(10),
        };
        let mut calls = 0;
        let mut sleeps = Vec::new();
        let result: Option<()> = policy.run(
            |_| {
                calls += 1;
                Err("down")
            },
            |d| sleeps.push(d),
        );
        assert_eq!(result, None);
        assert_eq!(calls, 3);
        // No sleep after the final attempt.
        assert_eq!(
            sleeps,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_split_for_request() {
        assert_eq!(split_for_request("cat", 100), vec!["cat"]);
        assert_eq!(
            split_for_request("a quick brown fox", 7),
            vec!["a quick", "brown", "fox"]
        );
        assert_eq!(split_for_request("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(split_for_request("   ", 10).is_empty());
    }

    #[test]
    fn test_silent_synthesizer_is_empty() {
        assert!(SilentSynthesizer.synthesize("hello").is_empty());
    }

    #[test]
    fn test_unreachable_endpoint_degrades_to_empty() {
        let settings = Settings {
            tts_retries: 2,
            tts_base_sleep_ms: 1,
            tts_timeout_secs: 1,
            ..Settings::default()
        };
        let tts = GoogleTts::new(&settings)
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/translate_tts");
        assert!(tts.synthesize("cat").is_empty());
        assert!(tts.synthesize("   ").is_empty());
    }
}
