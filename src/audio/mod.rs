//! Audio decoding for recordings cut into samples.

pub mod wav;

pub use wav::{Waveform, decode_wav, read_wav_file};
