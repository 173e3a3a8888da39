//! Uniformly partitioned FFT convolution (overlap-add).
//!
//! The impulse response is split into `fft_size / 2` segments whose spectra are
//! multiplied against a frequency-domain delay line of past input segments.
//! Feeding exactly `segment_size()` samples per call yields the same number of
//! output samples with no added latency.

#[cfg(not(feature = "real-fft"))]
mod complex_fft {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use rustfft::{num_complex::Complex, Fft, FftPlanner};

    #[derive(Clone)]
    pub struct Convolver {
        fft_size: usize,
        ir_segments: Vec<Vec<Complex<f32>>>,
        previous_frame_q: VecDeque<Vec<Complex<f32>>>,
        previous_tail: Vec<f32>,
        pending_output: Vec<f32>,
        fft_processor: Arc<dyn Fft<f32>>,
        ifft_processor: Arc<dyn Fft<f32>>,
    }

    impl Convolver {
        pub fn new(ir_signal: &[f32], fft_size: usize) -> Self {
            let mut planner = FftPlanner::<f32>::new();
            let fft_processor = planner.plan_fft_forward(fft_size);
            let ifft_processor = planner.plan_fft_inverse(fft_size);

            let ir_segments = segment_buffer(ir_signal, fft_size, &fft_processor);
            let segment_count = ir_segments.len();
            Self {
                fft_size,
                ir_segments,
                fft_processor,
                ifft_processor,
                previous_frame_q: init_previous_frame_q(segment_count, fft_size),
                previous_tail: vec![0.0; fft_size / 2],
                pending_output: Vec::new(),
            }
        }

        pub fn segment_size(&self) -> usize {
            self.fft_size / 2
        }

        pub fn process(&mut self, input_buffer: &[f32]) -> Vec<f32> {
            let io_len = input_buffer.len();
            let segment_size = self.fft_size / 2;
            let input_segments = segment_buffer(input_buffer, self.fft_size, &self.fft_processor);

            let mut output: Vec<f32> = Vec::with_capacity(io_len);
            let norm = self.fft_size as f32;

            if !self.pending_output.is_empty() {
                let take = io_len.min(self.pending_output.len());
                output.extend_from_slice(&self.pending_output[..take]);
                self.pending_output.drain(0..take);
            }

            for segment in input_segments {
                if self.ir_segments.is_empty() {
                    output.resize((output.len() + segment_size).min(io_len), 0.0);
                    continue;
                }
                self.previous_frame_q.push_front(segment);
                self.previous_frame_q.pop_back();

                let mut convolved = vec![Complex { re: 0.0, im: 0.0 }; self.fft_size];
                for (history, ir) in self.previous_frame_q.iter().zip(&self.ir_segments) {
                    multiply_accumulate(&mut convolved, history, ir);
                }
                self.ifft_processor.process(&mut convolved);

                let mut time_domain: Vec<f32> =
                    convolved.iter().map(|sample| sample.re / norm).collect();
                for (sample, tail) in time_domain.iter_mut().zip(&self.previous_tail) {
                    *sample += tail;
                }

                self.previous_tail = time_domain[segment_size..self.fft_size].to_vec();
                push_output(&mut output, &mut self.pending_output, &time_domain[..segment_size], io_len);
            }

            output
        }
    }

    fn multiply_accumulate(acc: &mut [Complex<f32>], a: &[Complex<f32>], b: &[Complex<f32>]) {
        for ((out, x), y) in acc.iter_mut().zip(a).zip(b) {
            *out += x * y;
        }
    }

    fn segment_buffer(
        buffer: &[f32],
        fft_size: usize,
        fft_processor: &Arc<dyn Fft<f32>>,
    ) -> Vec<Vec<Complex<f32>>> {
        let segment_size = fft_size / 2;
        buffer
            .chunks(segment_size)
            .map(|chunk| {
                let mut segment = vec![Complex { re: 0.0, im: 0.0 }; fft_size];
                for (slot, sample) in segment.iter_mut().zip(chunk) {
                    slot.re = *sample;
                }
                fft_processor.process(&mut segment);
                segment
            })
            .collect()
    }

    fn init_previous_frame_q(segment_count: usize, fft_size: usize) -> VecDeque<Vec<Complex<f32>>> {
        (0..segment_count)
            .map(|_| vec![Complex { re: 0.0, im: 0.0 }; fft_size])
            .collect()
    }

    use super::push_output;
}

#[cfg(feature = "real-fft")]
mod real_fft {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use log::warn;
    use realfft::num_complex::Complex;
    use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

    use super::push_output;

    #[derive(Clone)]
    pub struct Convolver {
        fft_size: usize,
        ir_segments: Vec<Vec<Complex<f32>>>,
        previous_frame_q: VecDeque<Vec<Complex<f32>>>,
        previous_tail: Vec<f32>,
        pending_output: Vec<f32>,
        r2c: Arc<dyn RealToComplex<f32>>,
        c2r: Arc<dyn ComplexToReal<f32>>,
    }

    impl Convolver {
        pub fn new(ir_signal: &[f32], fft_size: usize) -> Self {
            let mut planner = RealFftPlanner::<f32>::new();
            let r2c = planner.plan_fft_forward(fft_size);
            let c2r = planner.plan_fft_inverse(fft_size);
            let spectrum_len = (fft_size / 2) + 1;

            let ir_segments = segment_buffer(ir_signal, fft_size, &r2c, spectrum_len);
            let segment_count = ir_segments.len();
            Self {
                fft_size,
                ir_segments,
                r2c,
                c2r,
                previous_frame_q: init_previous_frame_q(segment_count, spectrum_len),
                previous_tail: vec![0.0; fft_size / 2],
                pending_output: Vec::new(),
            }
        }

        pub fn segment_size(&self) -> usize {
            self.fft_size / 2
        }

        pub fn process(&mut self, input_buffer: &[f32]) -> Vec<f32> {
            let io_len = input_buffer.len();
            let segment_size = self.fft_size / 2;
            let spectrum_len = (self.fft_size / 2) + 1;
            let input_segments =
                segment_buffer(input_buffer, self.fft_size, &self.r2c, spectrum_len);

            let mut output: Vec<f32> = Vec::with_capacity(io_len);
            let norm = self.fft_size as f32;

            if !self.pending_output.is_empty() {
                let take = io_len.min(self.pending_output.len());
                output.extend_from_slice(&self.pending_output[..take]);
                self.pending_output.drain(0..take);
            }

            for segment in input_segments {
                if self.ir_segments.is_empty() {
                    output.resize((output.len() + segment_size).min(io_len), 0.0);
                    continue;
                }
                self.previous_frame_q.push_front(segment);
                self.previous_frame_q.pop_back();

                let mut convolved = vec![Complex { re: 0.0, im: 0.0 }; spectrum_len];
                for (history, ir) in self.previous_frame_q.iter().zip(&self.ir_segments) {
                    multiply_accumulate(&mut convolved, history, ir);
                }
                // The inverse real FFT requires purely real DC and Nyquist bins.
                convolved[0].im = 0.0;
                convolved[spectrum_len - 1].im = 0.0;

                let mut time_domain = vec![0.0_f32; self.fft_size];
                if let Err(err) = self.c2r.process(&mut convolved, &mut time_domain) {
                    warn!("inverse real FFT failed: {}", err);
                    time_domain.fill(0.0);
                }

                for sample in &mut time_domain {
                    *sample /= norm;
                }
                for (sample, tail) in time_domain.iter_mut().zip(&self.previous_tail) {
                    *sample += tail;
                }

                self.previous_tail = time_domain[segment_size..self.fft_size].to_vec();
                push_output(&mut output, &mut self.pending_output, &time_domain[..segment_size], io_len);
            }

            output
        }
    }

    fn multiply_accumulate(acc: &mut [Complex<f32>], a: &[Complex<f32>], b: &[Complex<f32>]) {
        for ((out, x), y) in acc.iter_mut().zip(a).zip(b) {
            *out += x * y;
        }
    }

    fn segment_buffer(
        buffer: &[f32],
        fft_size: usize,
        r2c: &Arc<dyn RealToComplex<f32>>,
        spectrum_len: usize,
    ) -> Vec<Vec<Complex<f32>>> {
        let segment_size = fft_size / 2;
        buffer
            .chunks(segment_size)
            .map(|chunk| {
                let mut time_domain = vec![0.0_f32; fft_size];
                time_domain[..chunk.len()].copy_from_slice(chunk);

                let mut spectrum = vec![Complex { re: 0.0, im: 0.0 }; spectrum_len];
                if let Err(err) = r2c.process(&mut time_domain, &mut spectrum) {
                    warn!("forward real FFT failed: {}", err);
                    spectrum.fill(Complex { re: 0.0, im: 0.0 });
                }
                spectrum
            })
            .collect()
    }

    fn init_previous_frame_q(
        segment_count: usize,
        spectrum_len: usize,
    ) -> VecDeque<Vec<Complex<f32>>> {
        (0..segment_count)
            .map(|_| vec![Complex { re: 0.0, im: 0.0 }; spectrum_len])
            .collect()
    }
}

/// Move one convolved segment into the caller's output, parking any overflow.
fn push_output(output: &mut Vec<f32>, pending: &mut Vec<f32>, segment: &[f32], io_len: usize) {
    let remaining = io_len.saturating_sub(output.len());
    if remaining >= segment.len() {
        output.extend_from_slice(segment);
    } else {
        output.extend_from_slice(&segment[..remaining]);
        pending.extend_from_slice(&segment[remaining..]);
    }
}

#[cfg(not(feature = "real-fft"))]
pub use complex_fft::Convolver;

#[cfg(feature = "real-fft")]
pub use real_fft::Convolver;

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(input: &[f32], ir: &[f32]) -> Vec<f32> {
        (0..input.len())
            .map(|n| {
                (0..=n)
                    .filter(|k| n - k < ir.len())
                    .map(|k| input[k] * ir[n - k])
                    .sum::<f32>()
            })
            .collect()
    }

    #[test]
    fn unit_impulse_reproduces_input() {
        let mut convolver = Convolver::new(&[1.0], 64);
        let input: Vec<f32> = (0..32).map(|i| (i as f32 * 0.1).sin()).collect();
        let out = convolver.process(&input);
        assert_eq!(out.len(), 32);
        for (a, b) in input.iter().zip(&out) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn segment_sized_blocks_match_direct_convolution() {
        let ir: Vec<f32> = (0..100).map(|i| 0.9_f32.powi(i) * if i % 2 == 0 { 1.0 } else { -0.5 }).collect();
        let input: Vec<f32> = (0..256).map(|i| ((i * 7919) % 17) as f32 / 17.0 - 0.5).collect();
        let expected = direct_convolution(&input, &ir);

        let mut convolver = Convolver::new(&ir, 64);
        let segment = convolver.segment_size();
        let mut actual = Vec::new();
        for block in input.chunks(segment) {
            let out = convolver.process(block);
            assert_eq!(out.len(), block.len());
            actual.extend(out);
        }

        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn empty_impulse_response_outputs_silence() {
        let mut convolver = Convolver::new(&[], 64);
        let out = convolver.process(&[1.0; 32]);
        assert_eq!(out, vec![0.0; 32]);
    }
}
