//! Lookahead noise gate driven by a short RMS envelope.

/// Noise gate parameters. Times are in seconds unless the name says otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateParams {
    pub threshold_db: f32,
    pub attack: f32,
    pub release: f32,
    pub hold: f32,
    pub lookahead_ms: f32,
    pub rms_window: f32,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            threshold_db: -45.0,
            attack: 0.0005,
            release: 0.08,
            hold: 0.03,
            lookahead_ms: 5.0,
            rms_window: 0.01,
        }
    }
}

impl GateParams {
    /// Settings used by the render pipeline before the main chain.
    pub fn pipeline() -> Self {
        Self {
            threshold_db: -50.0,
            lookahead_ms: 10.0,
            ..Self::default()
        }
    }
}

/// Gates one channel.
pub fn gate_channel(input: &[f32], sample_rate: u32, params: &GateParams) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let sr = sample_rate.max(1) as f32;
    let threshold = 10.0f32.powf(params.threshold_db / 20.0);
    let attack_coeff = (-1.0 / (params.attack.max(1e-5) * sr)).exp();
    let release_coeff = (-1.0 / (params.release.max(1e-5) * sr)).exp();
    let hold_samples = (params.hold * sr) as usize;
    let lookahead = (params.lookahead_ms * sr / 1000.0) as usize;

    let rms_window = (params.rms_window * sr) as usize;
    let envelope = with_lookahead(&rms_envelope(input, rms_window), lookahead);

    let mut gain = 0.0f32;
    let mut hold = 0usize;
    input
        .iter()
        .zip(&envelope)
        .map(|(&x, &level)| {
            if level > threshold {
                gain += (1.0 - gain) * (1.0 - attack_coeff);
                hold = hold_samples;
            } else if hold > 0 {
                hold -= 1;
                gain += (1.0 - gain) * (1.0 - attack_coeff);
            } else {
                gain *= release_coeff;
            }
            x * gain
        })
        .collect()
}

/// Centred moving-average RMS over `window` samples, same length as the input.
fn rms_envelope(input: &[f32], window: usize) -> Vec<f32> {
    let n = input.len();
    let window = window.max(1);
    // prefix[i] = sum of squares of input[..i]
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &x in input {
        acc += (x as f64) * (x as f64);
        prefix.push(acc);
    }
    let ahead = (window - 1) / 2;
    let behind = window - 1 - ahead;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(behind);
            let hi = (i + ahead + 1).min(n);
            let mean = ((prefix[hi] - prefix[lo]) / window as f64).max(0.0);
            (mean + 1e-12).sqrt() as f32
        })
        .collect()
}

/// `max(env[i], env[i + lookahead])`; the tail compares against itself.
fn with_lookahead(envelope: &[f32], lookahead: usize) -> Vec<f32> {
    if lookahead == 0 {
        return envelope.to_vec();
    }
    envelope
        .iter()
        .enumerate()
        .map(|(i, &e)| envelope.get(i + lookahead).map_or(e, |&ahead| e.max(ahead)))
        .collect()
}
