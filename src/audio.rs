use std::io::{ErrorKind, Write};
use std::process::{Child, Command, Stdio};

use crate::logging;
use crate::settings::PLAYER_PRESET_LIST;

/// Audio playback collaborator: decodes and plays encoded audio bytes.
pub trait Playback: Send + Sync {
    /// Play `audio`. Returns immediately unless `wait` is set. Empty audio
    /// is a no-op.
    fn play(&self, audio: &[u8], format: &str, wait: bool) -> eyre::Result<()>;
}

/// Plays audio by piping it into an external decoder/player process.
#[derive(Debug, Clone)]
pub struct ExternalPlayer {
    player: String,
}

impl ExternalPlayer {
    /// `player` is "auto", a preset name, or a full command line. In a
    /// command line `{format}` is replaced by the audio format.
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }

    fn candidates(&self) -> Vec<String> {
        let player = self.player.trim();
        if player.is_empty() || player == "auto" {
            PLAYER_PRESET_LIST.iter().map(|p| p.to_string()).collect()
        } else {
            vec![player.to_string()]
        }
    }

    pub fn build_command(player: &str, format: &str) -> Option<(String, Vec<String>)> {
        let args: Vec<String> = match player {
            "mpv" => vec![
                "--no-video".to_string(),
                "--no-terminal".to_string(),
                "-".to_string(),
            ],
            "ffplay" => vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                "-f".to_string(),
                format.to_string(),
                "-i".to_string(),
                "-".to_string(),
            ],
            template => {
                let mut parts = template
                    .split_whitespace()
                    .map(|p| p.replace("{format}", format));
                let program = parts.next()?;
                return Some((program, parts.collect()));
            }
        };
        Some((player.to_string(), args))
    }

    fn spawn(program: &str, args: &[String]) -> std::io::Result<Child> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Detach from the controlling terminal so the player cannot read
        // keystrokes meant for the table.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        cmd.spawn()
    }
}

fn feed_and_wait(mut child: Child, audio: Vec<u8>) -> std::io::Result<()> {
    if let Some(mut stdin) = child.stdin.take() {
        // A player that exits early closes the pipe; that is not an error.
        if let Err(err) = stdin.write_all(&audio)
            && err.kind() != ErrorKind::BrokenPipe
        {
            return Err(err);
        }
    }
    child.wait()?;
    Ok(())
}

impl Playback for ExternalPlayer {
    fn play(&self, audio: &[u8], format: &str, wait: bool) -> eyre::Result<()> {
        if audio.is_empty() {
            return Ok(());
        }

        for candidate in self.candidates() {
            let Some((program, args)) = Self::build_command(&candidate, format) else {
                continue;
            };
            match Self::spawn(&program, &args) {
                Ok(child) => {
                    logging::debug(format!("playing {} bytes with {}", audio.len(), program));
                    let audio = audio.to_vec();
                    if wait {
                        feed_and_wait(child, audio)?;
                    } else {
                        std::thread::spawn(move || {
                            if let Err(err) = feed_and_wait(child, audio) {
                                logging::warn(format!("playback failed: {}", err));
                            }
                        });
                    }
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(eyre::eyre!("Failed to start {}: {}", program, err)),
            }
        }

        Err(eyre::eyre!(
            "No audio player found (install {} or set audio_player)",
            PLAYER_PRESET_LIST.join(" or ")
        ))
    }
}
