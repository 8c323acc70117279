// error_analysis.rs - Averages, jackknife errors and autocorrelation times of Monte Carlo series

/// Arithmetic mean; 0 for an empty series.
pub fn average(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Unbiased sample variance around `mean`.
pub fn variance(data: &[f64], mean: f64) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Naive standard error of the mean, ignoring autocorrelations.
pub fn naive_error(data: &[f64], mean: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    (variance(data, mean) / data.len() as f64).sqrt()
}

/// Jackknife error from leave-one-block-out estimates.
pub fn jackknife(block_estimates: &[f64]) -> f64 {
    let b = block_estimates.len();
    if b < 2 {
        return 0.0;
    }
    let jack_mean = average(block_estimates);
    let jack_var = block_estimates.iter().map(|&x| (x - jack_mean).powi(2)).sum::<f64>() * (b - 1) as f64 / b as f64;
    jack_var.sqrt()
}

/// Component-wise jackknife error of vector-valued block estimates.
pub fn jackknife_vec(block_estimates: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = block_estimates.first() else {
        return Vec::new();
    };
    (0..first.len())
        .map(|i| jackknife(&block_estimates.iter().map(|v| v[i]).collect::<Vec<_>>()))
        .collect()
}

/// Estimates of ⟨f(x)⟩ with one of `n_blocks` equal blocks left out each.
///
/// Trailing samples that do not fill a block are ignored.
pub fn jackknife_block_estimates<F>(data: &[f64], n_blocks: usize, f: F) -> Vec<f64>
where
    F: Fn(f64) -> f64,
{
    if n_blocks == 0 {
        return Vec::new();
    }
    let block_size = data.len() / n_blocks;
    if block_size == 0 {
        return vec![0.0; n_blocks];
    }
    let used = &data[..block_size * n_blocks];
    let total: f64 = used.iter().map(|&x| f(x)).sum();
    used.chunks(block_size)
        .map(|block| {
            let block_sum: f64 = block.iter().map(|&x| f(x)).sum();
            (total - block_sum) / (used.len() - block_size) as f64
        })
        .collect()
}

/// Integrated autocorrelation time with automatic windowing (Sokal 1989).
pub fn tau_int(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 10 {
        return 0.5;
    }

    let mean = average(data);
    let c0 = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if c0 == 0.0 {
        return 0.5;
    }

    let mut tau = 0.5;
    for t in 1..n / 4 {
        let ct = (0..n - t).map(|i| (data[i] - mean) * (data[i + t] - mean)).sum::<f64>() / (n - t) as f64;
        tau += ct / c0;
        // window condition
        if t as f64 >= 6.0 * tau {
            break;
        }
    }
    tau.max(0.5)
}

/// Container for the error estimates of one series
#[derive(Debug, Clone, Copy)]
pub struct ErrorEstimates {
    pub mean: f64,
    pub jack_error: f64,
    pub tau_int: f64,
    pub n_eff: f64,
}

impl ErrorEstimates {
    pub fn from_series(data: &[f64], n_blocks: usize) -> Self {
        let mean = average(data);
        let tau_int = tau_int(data);
        let jack_error = if n_blocks > 1 {
            jackknife(&jackknife_block_estimates(data, n_blocks, |x| x))
        } else {
            naive_error(data, mean)
        };
        Self { mean, jack_error, tau_int, n_eff: data.len() as f64 / (2.0 * tau_int) }
    }
}
