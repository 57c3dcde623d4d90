/// Share of the window given to the observation pane when it first appears.
pub const SPLIT_SHARE: f32 = 0.5;
/// Neither pane may be dragged below this share.
pub const MIN_PANE_SHARE: f32 = 0.3;

/// Chat/observation split. The pane is only shown once observations exist;
/// the empty to non-empty transition forces a single 50/50 split and the
/// pane never collapses on its own afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    observation_share: f32,
    previous_len: usize,
    forced: bool,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            observation_share: 0.0,
            previous_len: 0,
            forced: false,
        }
    }
}

impl PanelLayout {
    pub fn observation_share(&self) -> f32 {
        self.observation_share
    }

    /// New chat: the whole width goes to the conversation.
    pub fn reset(&mut self) {
        self.observation_share = 0.0;
        self.previous_len = 0;
        self.forced = true;
    }

    pub fn on_select(&mut self, observation_count: usize) {
        self.observation_share = if observation_count > 0 { SPLIT_SHARE } else { 0.0 };
        self.previous_len = observation_count;
        self.forced = true;
    }

    /// Called every frame with the active conversation's observation count.
    pub fn observe(&mut self, observation_count: usize) {
        if self.previous_len == 0 && observation_count > 0 {
            self.observation_share = SPLIT_SHARE;
            self.forced = true;
        }
        self.previous_len = observation_count;
    }

    pub fn shows_observations(observation_count: usize) -> bool {
        observation_count > 0
    }

    /// Share to impose on the pane this frame, if a programmatic layout
    /// change is pending.
    pub fn take_forced_share(&mut self) -> Option<f32> {
        if std::mem::take(&mut self.forced) {
            Some(self.observation_share.max(MIN_PANE_SHARE))
        } else {
            None
        }
    }

    /// Remembers a width the user dragged to.
    pub fn record_share(&mut self, share: f32) {
        self.observation_share = share.clamp(MIN_PANE_SHARE, 1.0 - MIN_PANE_SHARE);
    }
}
