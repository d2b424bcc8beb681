//! Analysis tap
//!
//! The render side captures a short window of post-chain audio each block,
//! computes a smoothed magnitude spectrum, and publishes Copy frames over a
//! bounded channel with `try_send`. Frames are dropped, not queued, when
//! the consumer lags, because visualizers want the latest picture rather
//! than history. The control side caches the most recent frame and serves
//! it read-only; nothing here feeds back into the chain.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Samples per analysis window (the FFT size)
pub const ANALYSIS_WINDOW: usize = 256;
/// Published frequency bins (half the window)
pub const ANALYSIS_BINS: usize = ANALYSIS_WINDOW / 2;
/// Exponential smoothing constant for the spectrum between frames
pub const ANALYSIS_SMOOTHING: f32 = 0.8;

/// One published analysis frame: magnitude spectrum plus the most recent
/// time-domain samples (mono mix).
#[derive(Debug, Clone, Copy)]
pub struct AnalysisFrame {
    pub spectrum: [f32; ANALYSIS_BINS],
    pub waveform: [f32; ANALYSIS_BINS],
}

impl Default for AnalysisFrame {
    fn default() -> Self {
        Self {
            spectrum: [0.0; ANALYSIS_BINS],
            waveform: [0.0; ANALYSIS_BINS],
        }
    }
}

/// Create the tap pair. The node goes into the graph's render half, the
/// tap is handed to visualization consumers.
pub fn analysis_pair() -> (TapNode, AnalysisTap) {
    let (tx, rx) = crossbeam_channel::bounded(4);
    (TapNode::new(tx), AnalysisTap::new(rx))
}

/// Render-side analysis node.
///
/// All buffers (FFT plan, scratch, window) are allocated at construction
/// on the control thread; `push_block` itself never allocates.
pub struct TapNode {
    window: [f32; ANALYSIS_WINDOW],
    position: usize,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    spectrum: [f32; ANALYSIS_BINS],
    tx: Sender<AnalysisFrame>,
}

impl std::fmt::Debug for TapNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapNode")
            .field("position", &self.position)
            .finish()
    }
}

impl TapNode {
    fn new(tx: Sender<AnalysisFrame>) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(ANALYSIS_WINDOW);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            window: [0.0; ANALYSIS_WINDOW],
            position: 0,
            fft,
            fft_buf: vec![Complex::default(); ANALYSIS_WINDOW],
            scratch: vec![Complex::default(); scratch_len],
            spectrum: [0.0; ANALYSIS_BINS],
            tx,
        }
    }

    /// Capture one interleaved block (post-chain) and publish a frame.
    pub fn push_block(&mut self, samples: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in samples.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            self.window[self.position] = mono;
            self.position = (self.position + 1) % ANALYSIS_WINDOW;
        }
        self.publish();
    }

    fn publish(&mut self) {
        // Unroll the ring so fft_buf is in chronological order.
        for (i, slot) in self.fft_buf.iter_mut().enumerate() {
            let index = (self.position + i) % ANALYSIS_WINDOW;
            *slot = Complex::new(self.window[index], 0.0);
        }
        self.fft.process_with_scratch(&mut self.fft_buf, &mut self.scratch);

        let scale = 2.0 / ANALYSIS_WINDOW as f32;
        for (bin, slot) in self.spectrum.iter_mut().enumerate() {
            let magnitude = self.fft_buf[bin].norm() * scale;
            *slot = ANALYSIS_SMOOTHING * *slot + (1.0 - ANALYSIS_SMOOTHING) * magnitude;
        }

        let mut frame = AnalysisFrame {
            spectrum: self.spectrum,
            waveform: [0.0; ANALYSIS_BINS],
        };
        for (i, slot) in frame.waveform.iter_mut().enumerate() {
            let index = (self.position + ANALYSIS_WINDOW - ANALYSIS_BINS + i) % ANALYSIS_WINDOW;
            *slot = self.window[index];
        }

        // Dropped when the consumer is behind; the next block replaces it.
        let _ = self.tx.try_send(frame);
    }
}

/// Control-side, read-only view of the analysis stream.
#[derive(Debug)]
pub struct AnalysisTap {
    rx: Receiver<AnalysisFrame>,
    latest: AnalysisFrame,
}

impl AnalysisTap {
    fn new(rx: Receiver<AnalysisFrame>) -> Self {
        Self {
            rx,
            latest: AnalysisFrame::default(),
        }
    }

    fn poll(&mut self) {
        while let Ok(frame) = self.rx.try_recv() {
            self.latest = frame;
        }
    }

    /// Latest magnitude spectrum, 128 bins.
    pub fn frequency_data(&mut self) -> [f32; ANALYSIS_BINS] {
        self.poll();
        self.latest.spectrum
    }

    /// Latest time-domain window, 128 samples (mono mix).
    pub fn waveform_data(&mut self) -> [f32; ANALYSIS_BINS] {
        self.poll();
        self.latest.waveform
    }

    /// Fill a caller-supplied buffer with byte-scaled spectrum data
    /// (0..=255 per bin), truncating or zero-padding to the buffer length.
    pub fn fill_analyser_data(&mut self, buffer: &mut [u8]) {
        self.poll();
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = if i < ANALYSIS_BINS {
                (self.latest.spectrum[i].clamp(0.0, 1.0) * 255.0) as u8
            } else {
                0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn push_sine(node: &mut TapNode, frequency: f32, sample_rate: f32, frames: usize) {
        let block: Vec<f32> = (0..frames * 2)
            .map(|i| {
                let t = (i / 2) as f32 / sample_rate;
                (2.0 * PI * frequency * t).sin()
            })
            .collect();
        node.push_block(&block, 2);
    }

    #[test]
    fn test_spectrum_peak_lands_in_right_bin() {
        let (mut node, mut tap) = analysis_pair();
        // Repeated blocks so the smoothed spectrum converges.
        for _ in 0..32 {
            push_sine(&mut node, 1000.0, 48000.0, 512);
        }

        let spectrum = tap.frequency_data();
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();

        // 1 kHz at 48 kHz / 256-point FFT -> bin ~5.3
        assert!(
            (4..=7).contains(&peak_bin),
            "peak in bin {peak_bin}, expected near 5"
        );
        assert!(spectrum[peak_bin] > 0.1);
    }

    #[test]
    fn test_waveform_tracks_input() {
        let (mut node, mut tap) = analysis_pair();
        let block = vec![0.25f32; 1024];
        node.push_block(&block, 2);

        let waveform = tap.waveform_data();
        assert!(waveform.iter().all(|&s| (s - 0.25).abs() < 1.0e-6));
    }

    #[test]
    fn test_consumer_lag_keeps_latest() {
        let (mut node, mut tap) = analysis_pair();
        // More publishes than channel capacity; none of this may block.
        for _ in 0..64 {
            node.push_block(&[0.5f32; 256], 2);
        }
        let waveform = tap.waveform_data();
        assert!(waveform[ANALYSIS_BINS - 1] != 0.0);
    }

    #[test]
    fn test_byte_scaled_output() {
        let (mut node, mut tap) = analysis_pair();
        for _ in 0..16 {
            push_sine(&mut node, 1000.0, 48000.0, 512);
        }
        let mut buffer = [0u8; ANALYSIS_BINS];
        tap.fill_analyser_data(&mut buffer);
        assert!(buffer.iter().any(|&b| b > 0));
    }

    #[test]
    fn test_empty_tap_reads_zero() {
        let (_node, mut tap) = analysis_pair();
        assert_eq!(tap.frequency_data(), [0.0; ANALYSIS_BINS]);
        let mut buffer = [9u8; 16];
        tap.fill_analyser_data(&mut buffer);
        assert_eq!(buffer, [0u8; 16]);
    }
}
