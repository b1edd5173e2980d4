/// `C(n, k)` in `u128`, saturating at `u128::MAX`. Zero when `k > n`.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u128;
    let n = n as u128;
    let mut result: u128 = 1;
    for i in 0..k {
        // exact at every step: result * (n - i) is divisible by (i + 1)
        result = match result.checked_mul(n - i) {
            Some(product) => product / (i + 1),
            None => {
                let g = gcd(n - i, i + 1);
                match (result / ((i + 1) / g)).checked_mul((n - i) / g) {
                    Some(value) => value,
                    None => return u128::MAX,
                }
            }
        };
    }
    result
}

/// Number of orderings `prod C(n_g, k_g)` over `(n_g, k_g)` pairs, saturating.
pub fn total_combinations<I>(groups: I) -> u128
where
    I: IntoIterator<Item = (usize, usize)>,
{
    groups
        .into_iter()
        .fold(1u128, |acc, (n, k)| acc.saturating_mul(binomial(n, k)))
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
