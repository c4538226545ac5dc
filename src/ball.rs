use {
    crate::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    std::array,
};

/// The shared integer names the player the ball was last thrown to, or
/// `NO_PLAYER` while somebody is holding it.
const NO_PLAYER: usize = usize::MAX;

struct Shared {
    thrown_to: AtomicUsize,
}

/// One player's handle to a shared ball.
///
/// At most one player holds the ball at any instant, so the holder may touch
/// whatever external resource the ball stands for without further
/// synchronisation. A player that wants the ball must poll [`try_catch`]
/// until the ball is thrown to it.
///
/// Every operation is wait-free and safe to call from a real-time thread.
///
/// [`try_catch`]: Player::try_catch
pub struct Player<const N: usize> {
    id: usize,
    holding: bool,
    shared: Arc<Shared>,
}

/// Creates a ball shared between `N` players and returns their handles, with
/// the ball initially in flight towards `first_catcher`.
///
/// # Panics
///
/// Panics if `N < 2` or `first_catcher` is not a valid player id.
pub fn ball<const N: usize>(first_catcher: usize) -> [Player<N>; N] {
    assert!(N >= 2, "a ball needs at least two players");
    assert!(
        first_catcher < N,
        "first catcher {first_catcher} is not a player id"
    );

    let shared = Arc::new(Shared {
        thrown_to: AtomicUsize::new(first_catcher),
    });

    array::from_fn(|id| Player {
        id,
        holding: false,
        shared: Arc::clone(&shared),
    })
}

impl<const N: usize> Player<N> {
    /// This player's id, in `0..N`.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether this player is currently holding the ball.
    pub fn holds_ball(&self) -> bool {
        self.holding
    }

    /// Attempts to catch the ball.
    ///
    /// Returns `true` if the ball was caught. Returns `false` if the ball is
    /// addressed to another player, and occasionally spuriously even when it
    /// is addressed to us; a poll loop will always succeed eventually.
    ///
    /// A successful catch acquires every write the previous holder made
    /// before its throw.
    ///
    /// # Panics
    ///
    /// Panics if this player is already holding the ball.
    pub fn try_catch(&mut self) -> bool {
        assert!(!self.holding, "caught a ball that is already held");

        if self
            .shared
            .thrown_to
            .compare_exchange_weak(self.id, NO_PLAYER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.holding = true;
        }

        self.holding
    }

    /// Throws the ball to `catcher`, releasing every write made while
    /// holding it.
    ///
    /// # Panics
    ///
    /// Panics if this player is not holding the ball, if `catcher` is this
    /// player, or if `catcher` is not a valid player id.
    pub fn throw_to(&mut self, catcher: usize) {
        assert!(self.holding, "threw a ball without holding it");
        assert!(catcher != self.id, "threw the ball to ourselves");
        assert!(catcher < N, "catcher {catcher} is not a player id");

        self.holding = false;
        self.shared.thrown_to.store(catcher, Ordering::Release);
    }

    /// Catches the ball unless it is already held.
    ///
    /// Returns whether this player now holds the ball.
    pub fn ensure(&mut self) -> bool {
        if !self.holding {
            self.try_catch();
        }

        self.holding
    }

    /// Runs `action` while holding the ball, then throws it to `catcher`.
    ///
    /// Does nothing if the ball could not be caught.
    pub fn with_ball(&mut self, catcher: usize, action: impl FnOnce()) {
        if !self.ensure() {
            return;
        }

        action();
        self.throw_to(catcher);
    }
}
