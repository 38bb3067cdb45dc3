/// Modified Bessel function of the first kind, order 0
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let quarter_x_sq = x * x / 4.0;
    for k in 1..=30 {
        term *= quarter_x_sq / (k * k) as f64;
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
    }
    sum
}

/// Kaiser window coefficients.
///
/// - `n`: window length
/// - `beta`: shape parameter (higher = wider mainlobe, lower sidelobes)
pub fn kaiser(n: usize, beta: f64) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = bessel_i0(beta);
    let last = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = 2.0 * i as f64 / last - 1.0;
            (bessel_i0(beta * (1.0 - x * x).max(0.0).sqrt()) / denom) as f32
        })
        .collect()
}

/// Kaiser beta for a target sidelobe attenuation in dB.
pub fn kaiser_beta(atten_db: f64) -> f64 {
    if atten_db > 50.0 {
        0.1102 * (atten_db - 8.7)
    } else if atten_db > 21.0 {
        0.5842 * (atten_db - 21.0).powf(0.4) + 0.07886 * (atten_db - 21.0)
    } else {
        0.0
    }
}
