//! Tick pipeline: the phase loop that advances a session.
//!
//! Each tick runs these phases, always in this order:
//!
//! 1. **Clock** -- turn the real delta into simulated seconds. Crossing a
//!    week boundary draws two reward options and pauses the session from
//!    the next tick on.
//! 2. **Spawn** -- passenger and station timers.
//! 3. **Trains** -- advance every train; on arrival run alighting and
//!    boarding through the router, then turn around at line ends.
//! 4. **Overload** -- grow or decay each station's overload timer.
//! 5. **Failure** -- halt if a station overflowed and the mode can fail.
//! 6. **Audit** -- resource validator and stranding sweep on their timers.
//!
//! A tick never panics and never returns an error to the caller. Internal
//! faults become [`TickOutcome::Fault`] and halt the session.

use std::collections::VecDeque;
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use metroline_routing::{AlightDecision, BoardDecision};
use metroline_types::{Passenger, StationId, TrainId};
use metroline_world::WorldError;

use crate::clock::ClockAdvance;
use crate::rewards::draw_options;
use crate::session::{HaltReason, Session, SessionState};

/// Errors raised inside a tick. Never returned to callers; see [`TickOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A network operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The world was found in a state it should never reach.
    #[error("internal fault: {message}")]
    Internal {
        /// What was inconsistent.
        message: String,
    },
}

impl TickError {
    fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Simulated seconds since the session started, after this tick.
    pub elapsed: f64,
    /// Simulated seconds this tick covered.
    pub dt: f64,
    /// Completed days.
    pub day: u64,
    /// Completed weeks.
    pub week: u64,
    /// Whether a week boundary was crossed.
    pub week_rolled: bool,
    /// Passengers delivered.
    pub delivered: u32,
    /// Passengers spawned.
    pub passengers_spawned: u32,
    /// Stations spawned.
    pub stations_spawned: Vec<StationId>,
    /// Resource leaks the validator corrected.
    pub leaks: usize,
    /// Stranded passengers evicted.
    pub evicted: u32,
    /// Whether the session halted during this tick.
    pub halted: bool,
}

/// Result of [`Session::tick`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The tick ran.
    Ok(TickSummary),
    /// The session is paused for a reward or halted; nothing ran.
    Idle,
    /// An internal fault halted the session.
    Fault {
        /// The fault message, also recorded in the halt reason.
        message: String,
    },
}

impl Session {
    /// Advance the session to the real timestamp `timestamp_ms`.
    ///
    /// Timestamps must be monotonic; the first one only sets the baseline.
    /// While paused or halted the baseline follows the timestamps so that
    /// resuming does not replay the pause.
    pub fn tick(&mut self, timestamp_ms: f64) -> TickOutcome {
        if !self.state.is_active() {
            self.clock.rebase(timestamp_ms);
            return TickOutcome::Idle;
        }
        let advance = self.clock.advance(timestamp_ms);
        self.run_tick(advance)
    }

    /// Advance the session by a real-time delta in seconds.
    ///
    /// The delta is clamped and scaled exactly as in [`Session::tick`].
    pub fn tick_real(&mut self, real_secs: f64) -> TickOutcome {
        if !self.state.is_active() {
            return TickOutcome::Idle;
        }
        let advance = self.clock.advance_real(real_secs);
        self.run_tick(advance)
    }

    fn run_tick(&mut self, advance: ClockAdvance) -> TickOutcome {
        match self.step(advance) {
            Ok(summary) => TickOutcome::Ok(summary),
            Err(err) => {
                let message = err.to_string();
                self.halt(HaltReason::Fault {
                    message: message.clone(),
                });
                TickOutcome::Fault { message }
            }
        }
    }

    fn step(&mut self, advance: ClockAdvance) -> Result<TickSummary, TickError> {
        let dt = advance.dt;
        let now = self.clock.elapsed();
        let mut summary = TickSummary {
            elapsed: now,
            dt,
            day: self.clock.day(),
            week: self.clock.week(),
            week_rolled: advance.week_rolled,
            ..TickSummary::default()
        };

        // --- Phase 1: Clock ---
        if advance.new_day {
            debug!(day = summary.day, week = summary.week, "new day");
        }
        if advance.week_rolled {
            self.offer_rewards();
        }

        // --- Phase 2: Spawn ---
        let report = self.spawner.step(
            dt,
            self.clock.week(),
            now,
            &mut self.network,
            &mut self.ids,
            &mut self.rng,
            &*self.geography,
            &self.config,
        )?;
        if !report.stations.is_empty() {
            self.evaluator.invalidate();
        }
        summary.passengers_spawned = report.passengers;
        summary.stations_spawned = report.stations;

        // --- Phase 3: Trains ---
        for train in self.network.train_ids() {
            self.advance_train(train, dt, now, &mut summary)?;
        }

        // --- Phase 4: Overload ---
        let overflowed = self.update_overload(dt);

        // --- Phase 5: Failure ---
        if let Some(station) = overflowed
            && self.mode.can_fail()
        {
            self.halt(HaltReason::Overcrowded { station });
            summary.halted = true;
            return Ok(summary);
        }

        // --- Phase 6: Audit ---
        self.audit_timer += dt;
        if self.audit_timer >= self.config.audit.validator_interval_secs {
            self.audit_timer -= self.config.audit.validator_interval_secs;
            summary.leaks = self.run_audit().leaks.len();
        }
        self.stranding_timer += dt;
        if self.stranding_timer >= self.config.audit.stranding_interval_secs {
            self.stranding_timer -= self.config.audit.stranding_interval_secs;
            summary.evicted = self.evict_stranded(now);
        }

        Ok(summary)
    }

    fn offer_rewards(&mut self) {
        let options = draw_options(&mut self.rng, &self.pool);
        info!(week = self.clock.week(), ?options, "week complete, reward offered");
        if !options.is_empty() {
            self.state = SessionState::PausedForReward { options };
        }
    }

    /// Move one train along its current segment, running the station stop
    /// if it arrives.
    fn advance_train(
        &mut self,
        id: TrainId,
        dt: f64,
        now: f64,
        summary: &mut TickSummary,
    ) -> Result<(), TickError> {
        let Some(train) = self.network.train(id) else {
            return Ok(());
        };
        let line = self
            .network
            .line(train.line)
            .ok_or_else(|| TickError::internal(format!("train {id} runs on missing {}", train.line)))?;
        let len = line.stations.len();
        let index = train.next_index;
        let target = line
            .stations
            .get(index)
            .copied()
            .ok_or_else(|| TickError::internal(format!("train {id} targets index {index} past the end of {}", line.id)))?;
        let previous = train
            .previous_index(len)
            .and_then(|i| line.stations.get(i))
            .copied();

        let position = |station: StationId| {
            self.network
                .station(station)
                .map(|s| s.position)
                .ok_or_else(|| TickError::internal(format!("{} references missing station {station}", line.id)))
        };
        let segment_length = match previous {
            Some(from) => position(from)?.distance(position(target)?),
            None => 0.0,
        };
        let progress = train.progress + self.config.trains.speed * dt / segment_length.max(1.0);

        if progress < 1.0 {
            if let Some(train) = self.network.train_mut(id) {
                train.progress = progress;
            }
            return Ok(());
        }
        self.arrive(id, target, index, len, now, summary)
    }

    /// Station stop: alight, board, then turn towards the next station.
    ///
    /// Riders and the station queue are taken out of the network for the
    /// duration so the router always sees the topology, never a half-moved
    /// passenger. Boarding follows queue order; transferring riders join
    /// the back of the queue after boarding.
    fn arrive(
        &mut self,
        id: TrainId,
        station: StationId,
        index: usize,
        len: usize,
        now: f64,
        summary: &mut TickSummary,
    ) -> Result<(), TickError> {
        let train = self
            .network
            .train_mut(id)
            .ok_or_else(|| TickError::internal(format!("train {id} vanished mid-tick")))?;
        let arriving = train.direction;
        let (departing, next_index) = match arriving.step(index, len) {
            Some(next) => (arriving, next),
            None => {
                let reversed = arriving.reversed();
                (reversed, reversed.step(index, len).unwrap_or(index))
            }
        };
        train.direction = departing;
        train.progress = 0.0;
        let riders = mem::take(&mut train.passengers);
        let view = train.clone();

        let queue = self
            .network
            .station_mut(station)
            .map(|s| mem::take(&mut s.queue))
            .unwrap_or_default();

        let mut aboard: Vec<Passenger> = Vec::with_capacity(riders.len());
        let mut transferring = Vec::new();
        for mut rider in riders {
            match self.router.should_alight(
                &mut self.evaluator,
                &self.network,
                &mut rider,
                station,
                &view,
            ) {
                AlightDecision::Deliver => {
                    summary.delivered = summary.delivered.saturating_add(1);
                    self.stats.delivered = self.stats.delivered.saturating_add(1);
                }
                AlightDecision::Transfer(line) => {
                    debug!(passenger = %rider.id, %station, %line, "transfer");
                    transferring.push(rider);
                }
                AlightDecision::Stay => aboard.push(rider),
            }
        }

        let mut seats = view.free_seats().saturating_sub(aboard.len());
        let mut waiting = VecDeque::with_capacity(queue.len().saturating_add(transferring.len()));
        for mut passenger in queue {
            if seats == 0 {
                waiting.push_back(passenger);
                continue;
            }
            match self.router.should_board(
                &mut self.evaluator,
                &self.network,
                &mut passenger,
                &view,
                station,
                now,
            ) {
                BoardDecision::Board(_) => {
                    seats = seats.saturating_sub(1);
                    aboard.push(passenger);
                }
                BoardDecision::Wait { .. } | BoardDecision::NoPath => {
                    waiting.push_back(passenger);
                }
            }
        }
        waiting.extend(transferring);

        match self.network.station_mut(station) {
            Some(s) => s.queue = waiting,
            None => {
                let dropped = u64::try_from(waiting.len()).unwrap_or(u64::MAX);
                self.stats.discarded = self.stats.discarded.saturating_add(dropped);
            }
        }
        let train = self
            .network
            .train_mut(id)
            .ok_or_else(|| TickError::internal(format!("train {id} vanished mid-tick")))?;
        train.passengers = aboard;
        train.next_index = next_index;
        Ok(())
    }

    /// Grow or decay every station's overload timer.
    ///
    /// Returns the first station whose timer is full.
    fn update_overload(&mut self, dt: f64) -> Option<StationId> {
        let threshold = usize::try_from(self.config.stations.capacity.saturating_sub(1))
            .unwrap_or(usize::MAX);
        let growth = self.config.stations.overload_growth_secs.max(f64::EPSILON);
        let decay = self.config.stations.overload_decay_secs.max(f64::EPSILON);

        let mut overflowed = None;
        for station in self.network.stations_mut() {
            let delta = if station.waiting() >= threshold {
                dt / growth
            } else {
                -dt / decay
            };
            station.overload = (station.overload + delta).clamp(0.0, 1.0);
            if overflowed.is_none() && station.overload >= 1.0 {
                overflowed = Some(station.id);
            }
        }
        overflowed
    }

    /// Evict waiting passengers no line can route any more.
    fn evict_stranded(&mut self, now: f64) -> u32 {
        let stations: Vec<StationId> = self.network.stations().map(|s| s.id).collect();
        let mut evicted = 0_u32;
        for id in stations {
            let Some(queue) = self.network.station_mut(id).map(|s| mem::take(&mut s.queue)) else {
                continue;
            };
            let before = queue.len();
            let kept: VecDeque<Passenger> = queue
                .into_iter()
                .filter(|p| {
                    !self
                        .router
                        .is_stranded(&mut self.evaluator, &self.network, p, now)
                })
                .collect();
            let removed = u32::try_from(before.saturating_sub(kept.len())).unwrap_or(u32::MAX);
            if removed > 0 {
                debug!(station = %id, removed, "stranded passengers evicted");
            }
            evicted = evicted.saturating_add(removed);
            if let Some(station) = self.network.station_mut(id) {
                station.queue = kept;
            }
        }
        self.stats.stranded_evicted = self.stats.stranded_evicted.saturating_add(u64::from(evicted));
        evicted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use metroline_types::{GameMode, PassengerId, Shape};
    use metroline_world::DryLand;

    use super::*;
    use crate::commands::ConnectTarget;
    use crate::config::SimulationConfig;

    fn session_with(config: SimulationConfig) -> Session {
        Session::new(config, Box::new(DryLand::default())).unwrap()
    }

    fn run(session: &mut Session, ticks: u32) {
        for _ in 0..ticks {
            session.tick_real(0.1);
        }
    }

    #[test]
    fn first_timestamp_only_sets_baseline() {
        let mut s = session_with(SimulationConfig::default());
        let TickOutcome::Ok(summary) = s.tick(1_000.0) else {
            panic!("expected a tick");
        };
        assert!(summary.dt.abs() < f64::EPSILON);
        let TickOutcome::Ok(summary) = s.tick(1_050.0) else {
            panic!("expected a tick");
        };
        assert!((summary.dt - 0.05).abs() < 1e-9);
    }

    #[test]
    fn train_carries_passenger_to_destination() {
        let mut s = session_with(SimulationConfig::default());
        let st = s.starting_stations().unwrap();
        s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
        s.network
            .station_mut(st.square)
            .unwrap()
            .queue
            .push_back(Passenger::new(PassengerId(900), st.square, Shape::Circle, 0.0));

        run(&mut s, 200);

        assert!(s.stats().delivered >= 1);
        let still_waiting = s
            .network()
            .stations()
            .flat_map(|st| st.queue.iter())
            .chain(s.network().trains().flat_map(|t| t.passengers.iter()))
            .any(|p| p.id == PassengerId(900));
        assert!(!still_waiting);
    }

    #[test]
    fn boarding_stops_when_the_train_is_full() {
        let mut config = SimulationConfig::default();
        config.passengers.spawn_interval_secs = 1_000.0;
        let mut s = session_with(config);
        let st = s.starting_stations().unwrap();
        s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
        let queue = &mut s.network.station_mut(st.square).unwrap().queue;
        for n in 0..8 {
            queue.push_back(Passenger::new(PassengerId(900 + n), st.square, Shape::Circle, 0.0));
        }

        // First stop at the square is near 4.2 s; the next circle stop is later.
        run(&mut s, 50);
        let train = s.network().trains().next().unwrap();
        assert_eq!(train.passengers.len(), 6);
        assert_eq!(train.free_seats(), 0);
        let left: Vec<_> = s
            .network()
            .station(st.square)
            .unwrap()
            .queue
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(left, vec![PassengerId(906), PassengerId(907)]);
    }

    #[test]
    fn trains_turn_around_at_line_ends() {
        let mut s = session_with(SimulationConfig::default());
        let st = s.starting_stations().unwrap();
        s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
        // About 250 units at 60 units/s: the first arrival is near 4.2 s.
        run(&mut s, 50);
        let train = s.network().trains().next().unwrap();
        assert_eq!(train.next_index, 0);
        assert_eq!(train.direction, metroline_types::Direction::Backward);
    }

    #[test]
    fn week_rollover_pauses_until_reward_chosen() {
        let mut config = SimulationConfig::default();
        config.time.seconds_per_day = 1.0;
        config.time.days_per_week = 1;
        let mut s = session_with(config);

        let mut rolled = false;
        for _ in 0..50 {
            if let TickOutcome::Ok(summary) = s.tick_real(0.1)
                && summary.week_rolled
            {
                rolled = true;
                break;
            }
        }
        assert!(rolled);
        let SessionState::PausedForReward { options } = s.state().clone() else {
            panic!("expected a reward pause, got {:?}", s.state());
        };
        assert_eq!(options.len(), 2);
        assert_ne!(options.first(), options.get(1));

        let elapsed = s.clock().elapsed();
        assert_eq!(s.tick_real(0.1), TickOutcome::Idle);
        assert!((s.clock().elapsed() - elapsed).abs() < f64::EPSILON);

        s.choose_reward(1).unwrap();
        assert!(matches!(s.tick_real(0.1), TickOutcome::Ok(_)));
    }

    #[test]
    fn overload_halts_normal_mode() {
        let mut config = SimulationConfig::default();
        config.stations.capacity = 1;
        config.stations.overload_growth_secs = 1.0;
        let mut s = session_with(config);

        let mut halted = false;
        for _ in 0..20 {
            if let TickOutcome::Ok(summary) = s.tick_real(0.1)
                && summary.halted
            {
                halted = true;
                break;
            }
        }
        assert!(halted);
        assert!(matches!(
            s.state(),
            SessionState::Halted {
                reason: HaltReason::Overcrowded { .. }
            }
        ));
        assert_eq!(s.tick_real(0.1), TickOutcome::Idle);
    }

    #[test]
    fn endless_mode_never_halts_on_overload() {
        let mut config = SimulationConfig::default();
        config.world.mode = GameMode::Endless;
        config.stations.capacity = 1;
        config.stations.overload_growth_secs = 1.0;
        let mut s = session_with(config);
        run(&mut s, 30);
        assert!(s.state().is_active());
        assert!(s.network().stations().all(|st| st.overload <= 1.0));
    }

    #[test]
    fn overload_decays_when_queue_is_short() {
        let mut s = session_with(SimulationConfig::default());
        let st = s.starting_stations().unwrap();
        s.network.station_mut(st.circle).unwrap().overload = 0.5;
        s.network.station_mut(st.circle).unwrap().queue.clear();
        run(&mut s, 10);
        let overload = s.network().station(st.circle).unwrap().overload;
        assert!(overload < 0.5);
    }

    #[test]
    fn stranded_passengers_are_evicted() {
        let mut config = SimulationConfig::default();
        config.routing.stranded_timeout_secs = 0.5;
        config.audit.stranding_interval_secs = 1.0;
        config.passengers.spawn_interval_secs = 1_000.0;
        let mut s = session_with(config);
        let st = s.starting_stations().unwrap();
        s.network
            .station_mut(st.circle)
            .unwrap()
            .queue
            .push_back(Passenger::new(PassengerId(900), st.circle, Shape::Star, 0.0));

        run(&mut s, 15);
        assert!(s.network().station(st.circle).unwrap().queue.is_empty());
        assert_eq!(s.stats().stranded_evicted, 1);
    }

    #[test]
    fn internal_fault_halts_instead_of_panicking() {
        let mut s = session_with(SimulationConfig::default());
        let st = s.starting_stations().unwrap();
        s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
        // Pull a station out from under the line, bypassing the commands.
        s.network.remove_station(st.square).unwrap();

        let outcome = s.tick_real(0.1);
        let TickOutcome::Fault { message } = outcome else {
            panic!("expected a fault, got {outcome:?}");
        };
        assert!(message.contains("missing station"));
        assert!(matches!(
            s.state(),
            SessionState::Halted {
                reason: HaltReason::Fault { .. }
            }
        ));
    }
}
