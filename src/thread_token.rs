#[cfg(test)]
mod tests;

/// Returns a token identifying the current thread.
///
/// The token is the address of a thread-local and is therefore never 0. It is
/// stable for the lifetime of the thread and distinct from the token of every
/// other thread that is alive at the same time.
///
/// The token of a terminated thread may be handed to a thread that starts
/// later. Read biasing only needs the token to be stable while its owner can
/// hold guards, so reuse across non-overlapping threads is harmless: the two
/// threads sharing a token can never contend.
#[inline(always)]
pub(crate) fn thread_token() -> usize {
    thread_local!(static THREAD_TOKEN: u8 = const { 0 });
    THREAD_TOKEN.with(|token| {
        let token: *const u8 = token;
        token as usize
    })
}
