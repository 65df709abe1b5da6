//! A simple player for headless runs.
//!
//! The autopilot grows the network one station at a time: each new
//! station is attached to the nearest line end, falling back to a new
//! line when no end will take it. At the end of a week it picks the
//! reward it values most and spends spare trains and wagons on the
//! busiest line.

use tracing::debug;

use metroline_core::{CommandOutcome, ConnectTarget, RewardOption, Session, SessionState};
use metroline_types::{LineId, ResourceKind, StationId};

/// Reward preference, best first.
const REWARD_PREFERENCE: [RewardOption; 5] = [
    RewardOption::ExtraTrain,
    RewardOption::NewLine,
    RewardOption::Wagon,
    RewardOption::Tunnels,
    RewardOption::Bridges,
];

/// Headless decision maker.
#[derive(Debug, Default)]
pub struct Autopilot {
    commands: u64,
    rejected: u64,
}

impl Autopilot {
    /// Create an autopilot.
    pub const fn new() -> Self {
        Self {
            commands: 0,
            rejected: 0,
        }
    }

    /// Commands issued and commands the session rejected.
    pub const fn counts(&self) -> (u64, u64) {
        (self.commands, self.rejected)
    }

    /// Lay the first line through the opening stations.
    pub fn bootstrap(&mut self, session: &mut Session) {
        let Some(start) = session.starting_stations() else {
            return;
        };
        self.issue(session, start.circle, start.triangle, ConnectTarget::Auto);
        self.issue(session, start.triangle, start.square, ConnectTarget::Auto);
    }

    /// Attach freshly spawned stations to the network.
    pub fn place(&mut self, session: &mut Session, stations: &[StationId]) {
        for &station in stations {
            self.attach(session, station);
        }
    }

    /// Resolve a pending reward and spend spare resources.
    ///
    /// Does nothing unless the session is paused for a reward.
    pub fn resolve_reward(&mut self, session: &mut Session) -> Option<RewardOption> {
        let SessionState::PausedForReward { options } = session.state() else {
            return None;
        };
        let index = REWARD_PREFERENCE
            .iter()
            .find_map(|wanted| options.iter().position(|o| o == wanted))
            .unwrap_or(0);
        let chosen = session.choose_reward(index).ok()?;
        self.spend_spares(session);
        Some(chosen)
    }

    fn attach(&mut self, session: &mut Session, station: StationId) {
        let Some(position) = session.network().station(station).map(|s| s.position) else {
            return;
        };

        // Nearest line end first.
        let mut ends: Vec<(f64, StationId, LineId)> = session
            .network()
            .lines()
            .flat_map(|l| [l.head(), l.tail()].into_iter().flatten().map(move |s| (s, l.id)))
            .filter_map(|(s, line)| {
                session
                    .network()
                    .station(s)
                    .map(|st| (st.position.distance(position), s, line))
            })
            .collect();
        ends.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, end, line) in ends {
            if self.issue(session, end, station, ConnectTarget::Extend(line)) {
                return;
            }
        }

        // Otherwise open a line to the nearest other station.
        let nearest = session
            .network()
            .stations()
            .filter(|s| s.id != station)
            .min_by(|a, b| {
                a.position
                    .distance(position)
                    .total_cmp(&b.position.distance(position))
            })
            .map(|s| s.id);
        if let Some(nearest) = nearest {
            self.issue(session, nearest, station, ConnectTarget::NewLine);
        }
    }

    /// Add trains to, and wagons on, the line with the most waiting passengers.
    fn spend_spares(&mut self, session: &mut Session) {
        let Some(line) = busiest_line(session) else {
            return;
        };
        while session.pool().has(ResourceKind::Trains, 1) {
            self.commands = self.commands.saturating_add(1);
            if session.add_train(line).is_err() {
                self.rejected = self.rejected.saturating_add(1);
                break;
            }
        }
        let trains: Vec<_> = session
            .network()
            .line(line)
            .map(|l| l.trains.clone())
            .unwrap_or_default();
        for train in trains {
            if !session.pool().has(ResourceKind::Wagons, 1) {
                break;
            }
            self.commands = self.commands.saturating_add(1);
            if session.add_wagon(train).is_err() {
                self.rejected = self.rejected.saturating_add(1);
            }
        }
    }

    fn issue(
        &mut self,
        session: &mut Session,
        from: StationId,
        to: StationId,
        target: ConnectTarget,
    ) -> bool {
        self.commands = self.commands.saturating_add(1);
        match session.connect(from, to, target) {
            Ok(CommandOutcome::LineCreated { line, .. }) => {
                debug!(%from, %to, %line, "autopilot opened a line");
                true
            }
            Ok(_) => true,
            Err(e) => {
                self.rejected = self.rejected.saturating_add(1);
                debug!(%from, %to, error = %e, "autopilot connect rejected");
                false
            }
        }
    }
}

fn busiest_line(session: &Session) -> Option<LineId> {
    let network = session.network();
    network
        .lines()
        .max_by_key(|line| {
            line.stations
                .iter()
                .filter_map(|s| network.station(*s))
                .map(|s| s.waiting())
                .sum::<usize>()
        })
        .map(|line| line.id)
}
