/// Polynomial (Rabin-Karp style) rolling hash over a fixed-size window.
///
/// All arithmetic is done modulo the Mersenne prime 2^61 - 1, so the hash
/// stays bounded no matter how many bytes are fed. The window is a circular
/// buffer: each update subtracts the outgoing byte's weighted contribution and
/// adds the new byte, so `update` is O(1).
pub const MODULUS: u64 = (1 << 61) - 1;

/// Default multiplier: the 64-bit FNV prime, well below the modulus.
pub const DEFAULT_BASE: u64 = 0x0000_0100_0000_01B3;

#[inline]
fn mul_mod(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) % MODULUS as u128) as u64
}

#[derive(Debug, Clone)]
pub struct RollingHash {
    window: Box<[u8]>,
    head: usize,
    filled: usize,
    base: u64,
    /// base^(window_size - 1) mod MODULUS, the weight of the oldest byte.
    out_weight: u64,
    hash: u64,
}

impl RollingHash {
    /// A zero `window_size` is treated as a one-byte window.
    pub fn new(window_size: usize, base: u64) -> Self {
        let window_size = window_size.max(1);
        let base = base % MODULUS;
        let mut out_weight = 1u64;
        for _ in 1..window_size {
            out_weight = mul_mod(out_weight, base);
        }
        Self {
            window: vec![0u8; window_size].into_boxed_slice(),
            head: 0,
            filled: 0,
            base,
            out_weight,
            hash: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// True once `window_size` bytes have been fed.
    pub fn is_primed(&self) -> bool {
        self.filled == self.window.len()
    }

    /// Push one byte into the window and return the new hash.
    ///
    /// Until the window is full the hash covers only the bytes seen so far.
    pub fn update(&mut self, byte: u8) -> u64 {
        if self.is_primed() {
            let outgoing = mul_mod(self.window[self.head] as u64, self.out_weight);
            self.hash = (self.hash + MODULUS - outgoing) % MODULUS;
        } else {
            self.filled += 1;
        }
        self.window[self.head] = byte;
        self.head = (self.head + 1) % self.window.len();
        self.hash = (mul_mod(self.hash, self.base) + byte as u64) % MODULUS;
        self.hash
    }

    pub fn digest(&self) -> u64 {
        self.hash
    }

    pub fn reset(&mut self) {
        self.window.fill(0);
        self.head = 0;
        self.filled = 0;
        self.hash = 0;
    }
}
