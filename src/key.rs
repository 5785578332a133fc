use crate::thread_token::thread_token;


/// Address bits dropped before a key is derived.
///
/// Collapsing one cache line onto one key decorrelates slot distribution from
/// small-object alignment and keeps guards for neighbouring objects from
/// contending on separate slots of the same line.
pub(crate) const CACHE_LINE_BITS: u32 = 6;

/// Multiplier for the thread-token mix, the 64-bit golden-ratio constant.
const TOKEN_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Key for a single-target acquisition on a symmetric layer.
#[inline]
pub(crate) fn simple(addr: usize) -> usize {
    addr >> CACHE_LINE_BITS
}

/// Key for one target of a batch acquisition on a symmetric layer.
///
/// The bias parameter exists so that symmetric and asymmetric batches share
/// one generation loop; it does not contribute to the key.
#[inline]
pub(crate) fn simple2(addr: usize, _bias: usize) -> usize {
    addr >> CACHE_LINE_BITS
}

/// Key for a read acquisition on an asymmetric layer.
///
/// `parallelism` must be a power of two. Reads from one thread always land on
/// the same one of the `parallelism` keys of `addr`; reads from different
/// threads are statistically spread across all of them.
#[inline]
pub(crate) fn biased(addr: usize, parallelism: usize) -> usize {
    (addr >> CACHE_LINE_BITS) + (thread_bias() & (parallelism - 1))
}

/// Key for one write-side slot of `addr` on an asymmetric layer.
///
/// Called with every bias in `[0, parallelism)` this produces a superset of
/// the keys [`biased`] can produce for `addr` on any thread, which is what
/// gives writers exclusive access.
#[inline]
pub(crate) fn biased2(addr: usize, bias: usize, parallelism: usize) -> usize {
    (addr >> CACHE_LINE_BITS) + (bias & (parallelism - 1))
}

/// Stable hash of the current thread's identity.
///
/// Thread tokens are thread-local addresses and share their low bits across
/// threads, so the token is multiplied and the upper half of the product is
/// taken to obtain bits that are usable as a bias.
#[inline]
fn thread_bias() -> usize {
    let mixed = (thread_token() as u64).wrapping_mul(TOKEN_MIX);
    (mixed >> 32) as usize
}
