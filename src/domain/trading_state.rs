//! Single-position trading state machine for stepwise environments.
//!
//! An agent picks one of three actions per stick. The state holds at most
//! one open position; the reward of each step is its running or realized
//! profit in price units.

use chrono::{DateTime, Utc};

use crate::domain::stick::Stick;

/// Realized winners are scaled by this factor.
pub const WIN_REWARD_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Short,
    Flat,
    Long,
}

impl Direction {
    /// Actions 0, 1 and 2 are short, flat and long.
    pub fn from_action(action: u8) -> Option<Self> {
        match action {
            0 => Some(Direction::Short),
            1 => Some(Direction::Flat),
            2 => Some(Direction::Long),
            _ => None,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
            Direction::Long => 1.0,
        }
    }

    /// Price paid to enter: longs buy at ask, shorts sell at bid.
    fn entry_price(&self, stick: &Stick) -> f64 {
        match self {
            Direction::Long => stick.ask_close,
            _ => stick.bid_close,
        }
    }

    /// Price received to exit: longs sell at bid, shorts buy back at ask.
    fn exit_price(&self, stick: &Stick) -> f64 {
        match self {
            Direction::Long => stick.bid_close,
            _ => stick.ask_close,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub direction: Direction,
    pub open_price: f64,
    pub open_datetime: DateTime<Utc>,
    pub running_profit: f64,
}

impl OpenPosition {
    fn mark(&mut self, price: f64) -> f64 {
        self.running_profit = (price - self.open_price) * self.direction.sign();
        self.running_profit
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub direction: Direction,
    pub open_price: f64,
    pub close_price: f64,
    pub open_datetime: DateTime<Utc>,
    pub close_datetime: DateTime<Utc>,
    pub profit: f64,
}

impl ClosedPosition {
    pub fn duration_hours(&self) -> f64 {
        (self.close_datetime - self.open_datetime).num_seconds() as f64 / 3600.0
    }

    /// Profit per hour held; 0 for positions closed on the stick they opened.
    pub fn profit_per_hour(&self) -> f64 {
        let hours = self.duration_hours();
        if hours == 0.0 { 0.0 } else { self.profit / hours }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub reward: f64,
    pub closed: Option<ClosedPosition>,
}

impl StepOutcome {
    fn reward(reward: f64) -> Self {
        StepOutcome {
            reward,
            closed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingState {
    pub position: Option<OpenPosition>,
}

impl TradingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(&self) -> Direction {
        self.position
            .as_ref()
            .map_or(Direction::Flat, |p| p.direction)
    }

    /// Apply the agent's choice for `stick`.
    ///
    /// Holding or repeating the open direction marks to market. The opposite
    /// direction closes the position and leaves the state flat.
    pub fn update_on_step(&mut self, stick: &Stick, direction: Direction) -> StepOutcome {
        let Some(position) = self.position.as_mut() else {
            if direction != Direction::Flat {
                self.position = Some(OpenPosition {
                    direction,
                    open_price: direction.entry_price(stick),
                    open_datetime: stick.datetime,
                    running_profit: 0.0,
                });
            }
            return StepOutcome::reward(0.0);
        };

        if direction == Direction::Flat || direction == position.direction {
            let price = position.direction.exit_price(stick);
            return StepOutcome::reward(position.mark(price));
        }

        let close_price = position.direction.exit_price(stick);
        let profit = position.mark(close_price);
        let closed = ClosedPosition {
            direction: position.direction,
            open_price: position.open_price,
            close_price,
            open_datetime: position.open_datetime,
            close_datetime: stick.datetime,
            profit,
        };
        self.position = None;

        let reward = if profit > 0.0 {
            profit * WIN_REWARD_MULTIPLIER
        } else {
            profit
        };
        StepOutcome {
            reward,
            closed: Some(closed),
        }
    }
}

/// Walks a stick series one step per action.
#[derive(Debug, Clone)]
pub struct TradingEnvironment {
    sticks: Vec<Stick>,
    window_size: usize,
    current_step: usize,
    state: TradingState,
    past_positions: Vec<ClosedPosition>,
}

impl TradingEnvironment {
    pub fn new(window_size: usize, sticks: Vec<Stick>) -> Self {
        TradingEnvironment {
            sticks,
            window_size,
            current_step: 0,
            state: TradingState::new(),
            past_positions: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.current_step = 0;
        self.state = TradingState::new();
        self.past_positions.clear();
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn past_positions(&self) -> &[ClosedPosition] {
        &self.past_positions
    }

    /// Up to `window_size` sticks ending at the current step.
    pub fn observation(&self) -> &[Stick] {
        if self.sticks.is_empty() {
            return &[];
        }
        let end = (self.current_step + 1).min(self.sticks.len());
        &self.sticks[end.saturating_sub(self.window_size)..end]
    }

    /// Act on the current stick and advance. Returns the step reward and
    /// whether the series is exhausted; a finished environment ignores
    /// further actions.
    pub fn step(&mut self, direction: Direction) -> (f64, bool) {
        if self.current_step + 1 >= self.sticks.len() {
            return (0.0, true);
        }

        let outcome = self
            .state
            .update_on_step(&self.sticks[self.current_step], direction);
        if let Some(closed) = outcome.closed {
            self.past_positions.push(closed);
        }

        self.current_step += 1;
        let done = self.current_step + 1 >= self.sticks.len();
        (outcome.reward, done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_stick(hour: i64, bid: f64, ask: f64) -> Stick {
        let datetime = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Stick {
            datetime,
            epoch_utc_ms: datetime.timestamp_millis(),
            ask_open: ask,
            ask_high: ask,
            ask_low: ask,
            ask_close: ask,
            bid_open: bid,
            bid_high: bid,
            bid_low: bid,
            bid_close: bid,
            volume: 0.0,
        }
    }

    #[test]
    fn actions_map_to_directions() {
        assert_eq!(Direction::from_action(0), Some(Direction::Short));
        assert_eq!(Direction::from_action(1), Some(Direction::Flat));
        assert_eq!(Direction::from_action(2), Some(Direction::Long));
        assert_eq!(Direction::from_action(3), None);
    }

    #[test]
    fn flat_hold_is_noop() {
        let mut state = TradingState::new();
        let out = state.update_on_step(&make_stick(0, 1.0, 1.1), Direction::Flat);
        assert_eq!(out.reward, 0.0);
        assert!(out.closed.is_none());
        assert_eq!(state.direction(), Direction::Flat);
    }

    #[test]
    fn long_opens_at_ask_and_marks_at_bid() {
        let mut state = TradingState::new();
        state.update_on_step(&make_stick(0, 1.00, 1.02), Direction::Long);
        let pos = state.position.as_ref().unwrap();
        assert_eq!(pos.open_price, 1.02);

        let out = state.update_on_step(&make_stick(1, 1.05, 1.07), Direction::Flat);
        assert!((out.reward - 0.03).abs() < 1e-12);
        let out = state.update_on_step(&make_stick(2, 1.06, 1.08), Direction::Long);
        assert!((out.reward - 0.04).abs() < 1e-12);
        assert_eq!(state.direction(), Direction::Long);
    }

    #[test]
    fn short_opens_at_bid_and_marks_at_ask() {
        let mut state = TradingState::new();
        state.update_on_step(&make_stick(0, 2.00, 2.02), Direction::Short);
        assert_eq!(state.position.as_ref().unwrap().open_price, 2.00);
        let out = state.update_on_step(&make_stick(1, 1.90, 1.92), Direction::Flat);
        assert!((out.reward - 0.08).abs() < 1e-12);
    }

    #[test]
    fn opposing_action_closes_winner_with_bonus() {
        let mut state = TradingState::new();
        state.update_on_step(&make_stick(0, 1.00, 1.02), Direction::Long);
        let out = state.update_on_step(&make_stick(4, 1.12, 1.14), Direction::Short);

        let closed = out.closed.unwrap();
        assert_eq!(closed.close_price, 1.12);
        assert!((closed.profit - 0.10).abs() < 1e-12);
        assert!((out.reward - 1.0).abs() < 1e-9);
        assert_eq!(closed.duration_hours(), 4.0);
        assert!((closed.profit_per_hour() - 0.025).abs() < 1e-12);
        assert_eq!(state.direction(), Direction::Flat);
    }

    #[test]
    fn losing_close_reward_is_unscaled() {
        let mut state = TradingState::new();
        state.update_on_step(&make_stick(0, 2.00, 2.02), Direction::Short);
        let out = state.update_on_step(&make_stick(0, 2.05, 2.10), Direction::Long);
        assert!((out.reward + 0.10).abs() < 1e-12);
        assert_eq!(out.closed.unwrap().profit_per_hour(), 0.0);
    }

    #[test]
    fn environment_done_at_penultimate_stick() {
        let sticks: Vec<Stick> = (0..4)
            .map(|i| make_stick(i, 1.0 + i as f64 * 0.1, 1.01 + i as f64 * 0.1))
            .collect();
        let mut env = TradingEnvironment::new(2, sticks);

        assert_eq!(env.observation().len(), 1);
        assert_eq!(env.step(Direction::Long), (0.0, false));
        assert_eq!(env.observation().len(), 2);
        let (_, done) = env.step(Direction::Flat);
        assert!(!done);
        let (reward, done) = env.step(Direction::Short);
        assert!(done);
        assert!(reward > 0.0);
        assert_eq!(env.past_positions().len(), 1);
        assert_eq!(env.step(Direction::Long), (0.0, true));

        env.reset();
        assert_eq!(env.current_step(), 0);
        assert!(env.past_positions().is_empty());
        assert_eq!(env.state().direction(), Direction::Flat);
    }
}
