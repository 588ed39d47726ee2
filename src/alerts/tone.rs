use rodio::{OutputStream, Sink, Source};
use std::f32::consts::PI;
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;
const FREQUENCY_HZ: f32 = 800.0;
const GAIN: f32 = 0.5;
const HOLD_SECS: f32 = 2.0;
const FADE_SECS: f32 = 0.5;

/// Short mono beep: a steady sine, then a linear fade to silence.
pub struct AlertTone {
    num_sample: usize,
    hold_samples: usize,
    total_samples: usize,
}

impl AlertTone {
    pub fn new() -> Self {
        let hold_samples = (HOLD_SECS * SAMPLE_RATE as f32) as usize;
        let fade_samples = (FADE_SECS * SAMPLE_RATE as f32) as usize;
        Self {
            num_sample: 0,
            hold_samples,
            total_samples: hold_samples + fade_samples,
        }
    }

    fn envelope(&self) -> f32 {
        if self.num_sample < self.hold_samples {
            return GAIN;
        }
        let fade_len = (self.total_samples - self.hold_samples) as f32;
        let into_fade = (self.num_sample - self.hold_samples) as f32;
        GAIN * (1.0 - into_fade / fade_len).max(0.0)
    }
}

impl Default for AlertTone {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for AlertTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        let sample = (2.0 * PI * FREQUENCY_HZ * t).sin() * self.envelope();
        self.num_sample += 1;
        Some(sample)
    }
}

impl Source for AlertTone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample.min(self.total_samples))
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(HOLD_SECS + FADE_SECS))
    }
}

enum ToneCommand {
    Play,
    Stop,
}

/// Plays [`AlertTone`] on a dedicated audio thread.
///
/// The output stream is not `Send`, so it never leaves that thread.
#[derive(Clone, Default)]
pub struct ToneHandle {
    tx: Arc<Mutex<Option<Sender<ToneCommand>>>>,
}

impl ToneHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_thread(&self) -> Result<Sender<ToneCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<ToneCommand>();

        thread::Builder::new()
            .name("alert-tone".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        ToneCommand::Play => {
                            if sink.is_none() {
                                match OutputStream::try_default() {
                                    Ok((stream, handle)) => match Sink::try_new(&handle) {
                                        Ok(new_sink) => {
                                            _stream = Some(stream);
                                            sink = Some(new_sink);
                                        }
                                        Err(err) => {
                                            log::warn!("Failed to create audio sink: {err}");
                                            continue;
                                        }
                                    },
                                    Err(err) => {
                                        log::warn!("No audio output for alert tone: {err}");
                                        continue;
                                    }
                                }
                            }
                            if let Some(ref s) = sink {
                                s.append(AlertTone::new());
                                s.play();
                            }
                        }
                        ToneCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    pub fn play(&self) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(ToneCommand::Play).map_err(|e| e.to_string())
    }

    /// Cut a tone that is still playing. No-op before the first `play`.
    pub fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(ToneCommand::Stop);
        }
    }
}
