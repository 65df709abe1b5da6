//! End-to-end scenarios and properties for a Metroline session.
//!
//! Everything here goes through the public session API. Where a scenario
//! needs passengers or stations placed by hand, the session is round-tripped
//! through a [`WorldSnapshot`] with the network edited in between.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use metroline_core::history::TopologySnapshot;
use metroline_core::{
    CommandError, CommandOutcome, ConnectTarget, HaltReason, RewardOption, Session,
    SessionState, SimulationConfig, TickOutcome, WorldSnapshot,
};
use metroline_ledger::measure_usage;
use metroline_routing::{BoardDecision, BoardReason, RouteEvaluator, Router};
use metroline_types::{
    GameMode, LineId, Passenger, PassengerId, Position, ResourceKind, Shape, Station, StationId,
};
use metroline_world::DryLand;

// =============================================================================
// Helpers
// =============================================================================

fn new_session(config: SimulationConfig) -> Session {
    Session::new(config, Box::new(DryLand::default())).unwrap()
}

/// Round-trip through a snapshot, letting `edit` change it in between.
fn edited(session: &Session, edit: impl FnOnce(&mut WorldSnapshot)) -> Session {
    let mut snapshot = session.snapshot();
    edit(&mut snapshot);
    Session::restore(
        snapshot,
        session.config().clone(),
        Box::new(DryLand::default()),
    )
    .unwrap()
}

fn slot(n: u8) -> LineId {
    LineId::new(n).unwrap()
}

fn assert_pool_matches_topology(session: &Session) {
    if !session.mode().resources_constrained() {
        return;
    }
    let pool = session.pool();
    let usage = measure_usage(session.network(), pool.total(ResourceKind::Tunnels));
    for kind in ResourceKind::ALL {
        assert_eq!(
            pool.available(kind),
            pool.total(kind).saturating_sub(usage.get(kind)),
            "{kind:?} drifted from the topology"
        );
    }
}

fn assert_no_short_lines(session: &Session) {
    for line in session.network().lines() {
        assert!(line.stations.len() >= 2, "{} has fewer than 2 stations", line.id);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn connect_then_disconnect_round_trips_a_line() {
    let mut s = new_session(SimulationConfig::default());
    let st = s.starting_stations().unwrap();

    let outcome = s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
    let CommandOutcome::LineCreated { line, train } = outcome else {
        panic!("expected a new line, got {outcome:?}");
    };
    assert_eq!(line, slot(0));
    let created = s.network().line(line).unwrap();
    assert_eq!(created.stations, vec![st.circle, st.square]);
    assert_eq!(created.trains, vec![train]);

    let outcome = s.disconnect(st.circle, st.square).unwrap();
    assert_eq!(outcome, CommandOutcome::LineDeleted { line });
    assert!(s.network().line(line).is_none());
    assert_eq!(s.network().train_count(), 0);
    assert_pool_matches_topology(&s);
}

#[test]
fn passenger_holds_out_for_a_cheaper_line_then_boards() {
    let mut s = new_session(SimulationConfig::default());
    let st = s.starting_stations().unwrap();
    // Line 0 needs a transfer to reach a square; line 1 goes there directly.
    s.connect(st.circle, st.triangle, ConnectTarget::Auto).unwrap();
    s.connect(st.circle, st.square, ConnectTarget::NewLine).unwrap();
    s.connect(st.triangle, st.square, ConnectTarget::NewLine).unwrap();

    let network = s.network();
    let train = network
        .trains()
        .find(|t| t.line == slot(0))
        .unwrap()
        .clone();
    let router = Router::default();
    let mut evaluator = RouteEvaluator::default();
    let mut passenger = Passenger::new(PassengerId(900), st.circle, Shape::Square, 0.0);

    let first = router.should_board(&mut evaluator, network, &mut passenger, &train, st.circle, 0.0);
    assert_eq!(
        first,
        BoardDecision::Wait {
            better: slot(1),
            waited: 0.0
        }
    );
    let later = router.should_board(&mut evaluator, network, &mut passenger, &train, st.circle, 2.0);
    assert!(matches!(later, BoardDecision::Wait { better, .. } if better == slot(1)));

    let expired = router.should_board(&mut evaluator, network, &mut passenger, &train, st.circle, 3.5);
    assert_eq!(
        expired,
        BoardDecision::Board(BoardReason::PreferenceWaitExpired)
    );
    assert!(passenger.wait_since.is_none());

    // With no cheaper alternative the same passenger boards straight away.
    let direct = network
        .trains()
        .find(|t| t.line == slot(1))
        .unwrap()
        .clone();
    let mut direct_passenger = Passenger::new(PassengerId(901), st.circle, Shape::Square, 0.0);
    assert!(matches!(
        router.should_board(&mut evaluator, network, &mut direct_passenger, &direct, st.circle, 0.0),
        BoardDecision::Board(_)
    ));
}

#[test]
fn preference_wait_survives_in_the_queue_between_arrivals() {
    let mut config = SimulationConfig::default();
    config.passengers.spawn_interval_secs = 1_000.0;
    let mut s = new_session(config);
    let st = s.starting_stations().unwrap();
    s.connect(st.circle, st.triangle, ConnectTarget::Auto).unwrap();
    s.connect(st.circle, st.square, ConnectTarget::NewLine).unwrap();
    s.connect(st.triangle, st.square, ConnectTarget::NewLine).unwrap();
    // The direct line keeps serving the circle but runs no train.
    let direct = s.network().line(slot(1)).unwrap().trains[0];
    s.remove_train(direct).unwrap();

    let rider = PassengerId(900);
    let mut s = edited(&s, |snap| {
        snap.network
            .station_mut(st.circle)
            .unwrap()
            .queue
            .push_back(Passenger::new(rider, st.circle, Shape::Square, 0.0));
    });
    let preference_wait = s.config().routing.preference_wait_secs;

    let queued_wait = |s: &Session| {
        s.network()
            .station(st.circle)
            .unwrap()
            .queue
            .iter()
            .find(|p| p.id == rider)
            .map(|p| p.wait_since)
    };
    let aboard = |s: &Session| {
        s.network()
            .trains()
            .find(|t| t.passengers.iter().any(|p| p.id == rider))
            .map(|t| (t.line, t.passengers.iter().find(|p| p.id == rider).unwrap().wait_since))
    };

    // First stop of the transfer line: the rider refuses and starts waiting.
    let mut started = None;
    for _ in 0..200 {
        s.tick_real(0.1);
        if let Some(Some(since)) = queued_wait(&s) {
            started = Some(since);
            break;
        }
    }
    let started = started.unwrap();
    assert!(aboard(&s).is_none());

    // The wait carries over to the next stop, where it has expired.
    let mut boarded_at = None;
    for _ in 0..200 {
        s.tick_real(0.1);
        if let Some((line, wait_since)) = aboard(&s) {
            assert_eq!(line, slot(0));
            assert!(wait_since.is_none());
            boarded_at = Some(s.clock().elapsed());
            break;
        }
        let still_waiting = queued_wait(&s)
            .flatten()
            .is_some_and(|since| (since - started).abs() < f64::EPSILON);
        assert!(still_waiting, "rider lost its wait start while queued");
    }
    assert!(boarded_at.unwrap() - started >= preference_wait);
    assert!(s.state().is_active());
}

#[test]
fn session_rejects_a_config_that_would_never_finish_a_tick() {
    let mut config = SimulationConfig::default();
    config.passengers.spawn_interval_secs = 0.0;
    assert!(Session::new(config.clone(), Box::new(DryLand::default())).is_err());

    let snapshot = new_session(SimulationConfig::default()).snapshot();
    assert!(Session::restore(snapshot, config, Box::new(DryLand::default())).is_err());

    let mut config = SimulationConfig::default();
    config.world.width = f64::NAN;
    assert!(Session::new(config, Box::new(DryLand::default())).is_err());
}

#[test]
fn crowded_station_halts_after_growth_window() {
    let s = new_session(SimulationConfig::default());
    let crowded = s.starting_stations().unwrap().circle;
    let mut s = edited(&s, |snap| {
        let station = snap.network.station_mut(crowded).unwrap();
        for n in 0..5 {
            station
                .queue
                .push_back(Passenger::new(PassengerId(900 + n), crowded, Shape::Star, 0.0));
        }
    });

    // Not yet: 15 s into a 20 s growth window.
    for _ in 0..150 {
        s.tick_real(0.1);
    }
    assert!(s.state().is_active());

    for _ in 0..100 {
        if s.state().is_halted() {
            break;
        }
        s.tick_real(0.1);
    }
    assert_eq!(
        s.state(),
        &SessionState::Halted {
            reason: HaltReason::Overcrowded { station: crowded }
        }
    );
    assert_eq!(s.tick_real(0.1), TickOutcome::Idle);
}

#[test]
fn crowded_station_never_halts_endless_mode() {
    let mut config = SimulationConfig::default();
    config.world.mode = GameMode::Endless;
    let s = new_session(config);
    let crowded = s.starting_stations().unwrap().circle;
    let mut s = edited(&s, |snap| {
        let station = snap.network.station_mut(crowded).unwrap();
        for n in 0..5 {
            station
                .queue
                .push_back(Passenger::new(PassengerId(900 + n), crowded, Shape::Star, 0.0));
        }
    });

    for _ in 0..400 {
        s.tick_real(0.1);
    }
    assert!(s.state().is_active());
}

#[test]
fn week_boundary_offers_two_rewards() {
    let mut config = SimulationConfig::default();
    config.world.mode = GameMode::Endless;
    let mut s = new_session(config);

    let mut ticks = 0;
    while s.state().is_active() {
        s.tick_real(0.1);
        ticks += 1;
        assert!(ticks < 2_000, "no week boundary after {ticks} ticks");
    }
    assert_eq!(s.clock().week(), 1);
    let SessionState::PausedForReward { options } = s.state().clone() else {
        panic!("expected a reward pause, got {:?}", s.state());
    };
    assert_eq!(options.len(), 2);
    assert_ne!(options[0], options[1]);

    for (index, option) in options.iter().enumerate() {
        let mut branch = edited(&s, |_| {});
        let (kind, bonus) = option.bonus();
        let before = branch.pool().total(kind);
        assert_eq!(branch.choose_reward(index), Ok(*option));
        assert_eq!(branch.pool().total(kind), before + bonus);
        assert!(branch.state().is_active());
        assert!(matches!(branch.tick_real(0.1), TickOutcome::Ok(_)));
    }
}

#[test]
fn reward_for_new_line_unlocks_a_fourth_line() {
    let s = new_session(SimulationConfig::default());
    let st = s.starting_stations().unwrap();
    let extra = StationId(500);
    let mut s = edited(&s, |snap| {
        snap.network
            .add_station(Station::new(extra, Shape::Pentagon, Position::new(100.0, 100.0)))
            .unwrap();
        snap.ids = metroline_types::IdAllocator::resume_after(500);
        snap.state = SessionState::PausedForReward {
            options: vec![RewardOption::NewLine, RewardOption::ExtraTrain],
        };
    });
    s.connect(st.circle, st.square, ConnectTarget::NewLine).unwrap();
    s.connect(st.circle, st.triangle, ConnectTarget::NewLine).unwrap();
    s.connect(st.square, st.triangle, ConnectTarget::NewLine)
        .unwrap();
    let denied = s.connect(st.circle, extra, ConnectTarget::NewLine).unwrap_err();
    assert!(matches!(denied, CommandError::ResourceDenied { .. }));

    s.choose_reward(0).unwrap();
    let denied = s.connect(st.circle, extra, ConnectTarget::NewLine).unwrap_err();
    assert!(matches!(
        denied,
        CommandError::ResourceDenied {
            kind: ResourceKind::Trains,
            ..
        }
    ));
}

// =============================================================================
// Properties
// =============================================================================

/// A session with a handful of extra stations to build on.
fn playground(mode: GameMode) -> (Session, Vec<StationId>) {
    let mut config = SimulationConfig::default();
    config.world.mode = mode;
    config.resources.lines = 6;
    config.resources.trains = 8;
    config.resources.wagons = 4;
    let s = new_session(config);
    let mut stations: Vec<StationId> = s.network().stations().map(|st| st.id).collect();
    let extras = [
        (Shape::Circle, 150.0, 150.0),
        (Shape::Square, 300.0, 650.0),
        (Shape::Triangle, 950.0, 200.0),
        (Shape::Star, 1_000.0, 650.0),
        (Shape::Circle, 200.0, 500.0),
    ];
    let s = edited(&s, |snap| {
        for (n, (shape, x, y)) in (100_u64..).zip(extras) {
            snap.network
                .add_station(Station::new(StationId(n), shape, Position::new(x, y)))
                .unwrap();
            stations.push(StationId(n));
        }
        snap.ids = metroline_types::IdAllocator::resume_after(200);
    });
    (s, stations)
}

/// Apply one random command. Errors are expected and ignored.
fn random_command(s: &mut Session, stations: &[StationId], rng: &mut StdRng) {
    let pick = |rng: &mut StdRng| stations[rng.random_range(0..stations.len())];
    let lines: Vec<LineId> = s.network().lines().map(|l| l.id).collect();
    let trains: Vec<_> = s.network().trains().map(|t| t.id).collect();
    let _ = match rng.random_range(0..8) {
        0..=2 => {
            let (a, b) = (pick(rng), pick(rng));
            s.connect(a, b, ConnectTarget::Auto)
        }
        3 => {
            let (a, b) = (pick(rng), pick(rng));
            s.connect(a, b, ConnectTarget::NewLine)
        }
        4 => {
            let (a, b) = (pick(rng), pick(rng));
            s.disconnect(a, b)
        }
        5 if !lines.is_empty() => s.add_train(lines[rng.random_range(0..lines.len())]),
        6 if !trains.is_empty() => s.add_wagon(trains[rng.random_range(0..trains.len())]),
        7 if !trains.is_empty() => s.remove_train(trains[rng.random_range(0..trains.len())]),
        _ => s.undo(),
    };
}

#[test]
fn pool_always_matches_topology() {
    for seed in 0..20 {
        let (mut s, stations) = playground(GameMode::Normal);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..60 {
            random_command(&mut s, &stations, &mut rng);
            assert_pool_matches_topology(&s);
            assert_no_short_lines(&s);
            if rng.random_bool(0.3) {
                s.tick_real(0.1);
            }
        }
    }
}

#[test]
fn undo_then_redo_restores_exact_topology() {
    for seed in 0..20 {
        let (mut s, stations) = playground(GameMode::Normal);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..10 {
            random_command(&mut s, &stations, &mut rng);
        }
        if !s.can_undo() {
            continue;
        }
        let before = TopologySnapshot::capture(s.network());
        s.undo().unwrap();
        s.redo().unwrap();
        let after = TopologySnapshot::capture(s.network());
        assert_eq!(after.lines, before.lines, "seed {seed}");
        assert_pool_matches_topology(&s);
    }
}

#[test]
fn undo_walks_back_to_a_consistent_state() {
    let (mut s, stations) = playground(GameMode::Normal);
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..30 {
        random_command(&mut s, &stations, &mut rng);
    }
    assert!(s.can_undo());

    let mut undone = 0;
    while s.can_undo() {
        s.undo().unwrap();
        undone += 1;
        assert_no_short_lines(&s);
        assert_pool_matches_topology(&s);
    }
    assert!(undone <= 10, "history kept {undone} entries");
    assert_eq!(s.undo(), Err(CommandError::NothingToUndo));
}

#[test]
fn reachability_is_monotonic_in_depth() {
    for seed in 0..10 {
        let (mut s, stations) = playground(GameMode::Creative);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..25 {
            random_command(&mut s, &stations, &mut rng);
        }
        let lines: Vec<LineId> = s.network().lines().map(|l| l.id).collect();
        for line in lines {
            for shape in Shape::ALL {
                let mut reached = false;
                for depth in 0..5 {
                    let now = s.can_reach(line, shape, depth);
                    assert!(!reached || now, "{line} lost {shape:?} at depth {depth}");
                    reached |= now;
                }
            }
        }
    }
}

#[test]
fn creative_mode_ignores_resource_limits() {
    let (mut s, stations) = playground(GameMode::Creative);
    for pair in stations.windows(2) {
        s.connect(pair[0], pair[1], ConnectTarget::NewLine).unwrap();
    }
    assert_eq!(s.network().line_count(), stations.len() - 1);
    assert_no_short_lines(&s);
}

#[test]
fn long_run_stays_healthy() {
    let mut config = SimulationConfig::default();
    config.world.mode = GameMode::Endless;
    let mut s = new_session(config);
    let st = s.starting_stations().unwrap();
    s.connect(st.circle, st.square, ConnectTarget::Auto).unwrap();
    s.connect(st.square, st.triangle, ConnectTarget::Auto).unwrap();

    for _ in 0..3_000 {
        match s.tick_real(0.1) {
            TickOutcome::Fault { message } => panic!("tick fault: {message}"),
            TickOutcome::Idle => {
                s.choose_reward(0).unwrap();
            }
            TickOutcome::Ok(_) => {}
        }
        for train in s.network().trains() {
            assert!((0.0..1.0).contains(&train.progress));
        }
    }
    assert!(s.stats().delivered > 0);
    assert!(s.network().station_count() > 3);
    assert_pool_matches_topology(&s);
}
