//! Safe wrappers around SpeexDSP's preprocessor (denoise/AGC) and echo canceller.

use std::ffi::{c_int, c_void};

// ======================== FFI declarations ========================

/// Opaque type for SpeexPreprocessState
#[repr(C)]
pub struct SpeexPreprocessState {
    _private: [u8; 0],
}

/// Opaque type for SpeexEchoState
#[repr(C)]
pub struct SpeexEchoState {
    _private: [u8; 0],
}

// Preprocessor request constants
const SPEEX_PREPROCESS_SET_DENOISE: c_int = 0;
const SPEEX_PREPROCESS_SET_AGC: c_int = 2;
const SPEEX_PREPROCESS_SET_AGC_LEVEL: c_int = 6;
const SPEEX_PREPROCESS_SET_NOISE_SUPPRESS: c_int = 18;

// Echo canceller request constants
const SPEEX_ECHO_SET_SAMPLING_RATE: c_int = 24;

unsafe extern "C" {
    fn speex_preprocess_state_init(frame_size: c_int, sampling_rate: c_int)
        -> *mut SpeexPreprocessState;
    fn speex_preprocess_state_destroy(st: *mut SpeexPreprocessState);
    fn speex_preprocess_run(st: *mut SpeexPreprocessState, x: *mut i16) -> c_int;
    fn speex_preprocess_ctl(
        st: *mut SpeexPreprocessState,
        request: c_int,
        ptr: *mut c_void,
    ) -> c_int;

    fn speex_echo_state_init(frame_size: c_int, filter_length: c_int) -> *mut SpeexEchoState;
    fn speex_echo_state_destroy(st: *mut SpeexEchoState);
    fn speex_echo_state_reset(st: *mut SpeexEchoState);
    fn speex_echo_ctl(st: *mut SpeexEchoState, request: c_int, ptr: *mut c_void) -> c_int;
    fn speex_echo_playback(st: *mut SpeexEchoState, play: *const i16);
    fn speex_echo_capture(st: *mut SpeexEchoState, rec: *const i16, out: *mut i16);
}

// ======================== Preprocessor (denoise + AGC) ========================

/// Safe wrapper around SpeexPreprocessState for noise suppression and AGC.
pub struct Preprocessor {
    state: *mut SpeexPreprocessState,
}

// SpeexPreprocessState is used from a single thread only
unsafe impl Send for Preprocessor {}

impl Preprocessor {
    /// Create a new preprocessor for a given frame size (in samples) and sample rate.
    pub fn new(frame_size: usize, sample_rate: u32) -> anyhow::Result<Self> {
        let state = unsafe {
            speex_preprocess_state_init(frame_size as c_int, sample_rate as c_int)
        };
        if state.is_null() {
            anyhow::bail!("Failed to initialize speex preprocessor");
        }
        Ok(Self { state })
    }

    /// Enable or disable denoising.
    pub fn set_denoise(&mut self, enable: bool) {
        let mut val: c_int = if enable { 1 } else { 0 };
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_DENOISE,
                &mut val as *mut c_int as *mut c_void,
            );
        }
    }

    /// Set noise suppress level in dB (negative value, e.g. -25).
    pub fn set_noise_suppress(&mut self, level: i32) {
        let mut val: c_int = level;
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_NOISE_SUPPRESS,
                &mut val as *mut c_int as *mut c_void,
            );
        }
    }

    /// Enable or disable automatic gain control.
    pub fn set_agc(&mut self, enable: bool) {
        let mut val: c_int = if enable { 1 } else { 0 };
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_AGC,
                &mut val as *mut c_int as *mut c_void,
            );
        }
    }

    /// Set AGC level (target signal level).
    pub fn set_agc_level(&mut self, level: f32) {
        let mut val: f32 = level;
        unsafe {
            speex_preprocess_ctl(
                self.state,
                SPEEX_PREPROCESS_SET_AGC_LEVEL,
                &mut val as *mut f32 as *mut c_void,
            );
        }
    }

    /// Run the preprocessor on a frame of 16-bit PCM mono samples.
    /// The samples are modified in-place.
    pub fn process(&mut self, samples: &mut [i16]) {
        unsafe {
            speex_preprocess_run(self.state, samples.as_mut_ptr());
        }
    }
}

impl Drop for Preprocessor {
    fn drop(&mut self) {
        unsafe {
            speex_preprocess_state_destroy(self.state);
        }
    }
}

// ======================== Echo canceller ========================

/// Safe wrapper around SpeexEchoState.
///
/// The playback worker feeds the far-end reference through `playback`; the
/// capture thread cancels echo from mic frames through `capture`. Both run
/// against one shared state, so the engine guards it with a mutex.
pub struct EchoCanceller {
    state: *mut SpeexEchoState,
    frame_size: usize,
    /// Playback reference samples awaiting a full frame.
    pending: Vec<i16>,
    scratch: Vec<i16>,
}

unsafe impl Send for EchoCanceller {}

impl EchoCanceller {
    /// Create a new echo canceller.
    ///
    /// * `frame_size`   - Samples per processed frame (must match capture batches)
    /// * `tail_samples` - Echo tail length of the adaptive filter, in samples
    /// * `sample_rate`  - Sample rate in Hz
    pub fn new(frame_size: usize, tail_samples: usize, sample_rate: u32) -> anyhow::Result<Self> {
        let state =
            unsafe { speex_echo_state_init(frame_size as c_int, tail_samples as c_int) };
        if state.is_null() {
            anyhow::bail!("Failed to initialize speex echo canceller");
        }
        let mut rate: c_int = sample_rate as c_int;
        unsafe {
            speex_echo_ctl(
                state,
                SPEEX_ECHO_SET_SAMPLING_RATE,
                &mut rate as *mut c_int as *mut c_void,
            );
        }
        Ok(Self {
            state,
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            scratch: vec![0; frame_size],
        })
    }

    /// Feed played-back samples as the far-end echo reference.
    ///
    /// Samples are buffered until a full frame is available; only the
    /// sub-frame remainder is kept between calls.
    pub fn playback(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_size {
            unsafe {
                speex_echo_playback(self.state, self.pending.as_ptr());
            }
            self.pending.drain(..self.frame_size);
        }
    }

    /// Cancel echo from a captured mic frame in-place.
    ///
    /// The frame length must equal the configured frame size; shorter partial
    /// reads pass through uncancelled.
    pub fn capture(&mut self, frame: &mut [i16]) {
        if frame.len() != self.frame_size {
            return;
        }
        unsafe {
            speex_echo_capture(self.state, frame.as_ptr(), self.scratch.as_mut_ptr());
        }
        frame.copy_from_slice(&self.scratch);
    }

    /// Reset the adaptive filter and drop any pending reference samples.
    pub fn reset(&mut self) {
        self.pending.clear();
        unsafe {
            speex_echo_state_reset(self.state);
        }
    }
}

impl Drop for EchoCanceller {
    fn drop(&mut self) {
        unsafe {
            speex_echo_state_destroy(self.state);
        }
    }
}
