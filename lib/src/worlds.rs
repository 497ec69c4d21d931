//! World-Link Synchronizer.
//!
//! Keeps the map of which worlds are linked in the current regional matchup.
//! The map starts unsynchronized and becomes available after the first fetch
//! that accounts for every known world. Later fetches replace it wholesale or
//! are discarded; it is never merged.
//!
//! The refresh loop reschedules itself for when the current matchup ends,
//! with a floor so an overdue matchup does not hammer the API.

use crate::error::{WorldError, WorldResult};
use crate::game::{GameApi, Matchup};
use crate::id::WorldId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shortest wait between two refreshes.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(60);

/// Wait between refreshes when no matchup end time is known.
pub const FALLBACK_REFRESH_DELAY: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// World table
// ============================================================================

/// A game world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct World {
    /// World ID
    pub id: WorldId,
    /// Display name
    pub name: &'static str,
}

/// A WvW team standing in for a world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Team {
    /// Team ID as reported in matchups
    pub id: WorldId,
    /// Display name
    pub name: &'static str,
    /// World the team replaced
    pub world: WorldId,
}

macro_rules! worlds {
    ($($id:literal => $name:literal),* $(,)?) => {
        &[$(World { id: WorldId($id), name: $name }),*]
    };
}

macro_rules! teams {
    ($($id:literal => $name:literal @ $world:literal),* $(,)?) => {
        &[$(Team { id: WorldId($id), name: $name, world: WorldId($world) }),*]
    };
}

/// Every known world.
pub static WORLDS: &[World] = worlds![
    1001 => "Anvil Rock",
    1002 => "Borlis Pass",
    1003 => "Yak's Bend",
    1004 => "Henge of Denravi",
    1005 => "Maguuma",
    1006 => "Sorrow's Furnace",
    1007 => "Gate of Madness",
    1008 => "Jade Quarry",
    1009 => "Fort Aspenwood",
    1010 => "Ehmry Bay",
    1011 => "Stormbluff Isle",
    1012 => "Darkhaven",
    1013 => "Sanctum of Rall",
    1014 => "Crystal Desert",
    1015 => "Isle of Janthir",
    1016 => "Sea of Sorrows",
    1017 => "Tarnished Coast",
    1018 => "Northern Shiverpeaks",
    1019 => "Blackgate",
    1020 => "Ferguson's Crossing",
    1021 => "Dragonbrand",
    1022 => "Kaineng",
    1023 => "Devona's Rest",
    1024 => "Eredon Terrace",
    2001 => "Fissure of Woe",
    2002 => "Desolation",
    2003 => "Gandara",
    2004 => "Blacktide",
    2005 => "Ring of Fire",
    2006 => "Underworld",
    2007 => "Far Shiverpeaks",
    2008 => "Whiteside Ridge",
    2009 => "Ruins of Surmia",
    2010 => "Seafarer's Rest",
    2011 => "Vabbi",
    2012 => "Piken Square",
    2013 => "Aurora Glade",
    2014 => "Gunnar's Hold",
    2101 => "Jade Sea [FR]",
    2102 => "Fort Ranik [FR]",
    2103 => "Augury Rock [FR]",
    2104 => "Vizunah Square [FR]",
    2105 => "Arborstone [FR]",
    2201 => "Kodash [DE]",
    2202 => "Riverside [DE]",
    2203 => "Elona Reach [DE]",
    2204 => "Abaddon's Mouth [DE]",
    2205 => "Drakkar Lake [DE]",
    2206 => "Miller's Sound [DE]",
    2207 => "Dzagonur [DE]",
    2301 => "Baruch Bay [SP]",
];

/// Teams that replaced worlds in matchup reports.
pub static TEAMS: &[Team] = teams![
    11001 => "Moogooloo" @ 1001,
    11002 => "Rall's Rest" @ 1002,
    11003 => "Domain of Torment" @ 1003,
    11004 => "Yohlon Haven" @ 1004,
    11005 => "Tombs of Drascir" @ 1005,
    11006 => "Hall of Judgment" @ 1006,
    11007 => "Throne of Balthazar" @ 1007,
    11008 => "Dwayna's Temple" @ 1008,
    11009 => "Abbaddon's Prison" @ 1009,
    11010 => "Ruined Cathedral of Blood" @ 1010,
    11011 => "Lutgardis Conservatory" @ 1011,
    11012 => "Mosswood" @ 1012,
    11013 => "Mithric Cliffs" @ 1013,
    11014 => "Lagula's Kraal" @ 1014,
    11015 => "De Molish Post" @ 1015,
    12001 => "Skrittsburgh" @ 2001,
    12002 => "Fortune's Vale" @ 2002,
    12003 => "Silent Woods" @ 2003,
    12004 => "Ettin's Back" @ 2004,
    12005 => "Domain of Anguish" @ 2005,
    12006 => "Palawadan" @ 2006,
    12007 => "Bloodstone Gulch" @ 2007,
    12008 => "Frost Citadel" @ 2008,
    12009 => "Dragrimmar" @ 2009,
    12010 => "Grenth's Door" @ 2010,
    12011 => "Mirror of Lyssa" @ 2011,
    12012 => "Melandru's Dome" @ 2012,
    12013 => "Kormir's Library" @ 2013,
    12014 => "Great House Aviary" @ 2014,
    12015 => "Bava Nisos" @ 2101,
    12016 => "Temple of Febe" @ 2102,
    12017 => "Gyala Hatchery" @ 2103,
    12018 => "Grekvelnn Burrows" @ 2104,
];

/// Display name of a world or team.
pub fn world_name(id: WorldId) -> Option<&'static str> {
    WORLDS
        .iter()
        .find(|w| w.id == id)
        .map(|w| w.name)
        .or_else(|| TEAMS.iter().find(|t| t.id == id).map(|t| t.name))
}

/// The world a team stands in for, or the ID itself.
pub fn canonical_world(id: WorldId) -> WorldId {
    TEAMS.iter().find(|t| t.id == id).map_or(id, |t| t.world)
}

/// IDs of every known world.
pub fn known_worlds() -> Vec<WorldId> {
    WORLDS.iter().map(|w| w.id).collect()
}

// ============================================================================
// Linked worlds
// ============================================================================

/// Links of every world for one set of matchups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedWorlds {
    links: HashMap<WorldId, BTreeSet<WorldId>>,
    end_time: Option<DateTime<Utc>>,
}

impl LinkedWorlds {
    /// Build links from matchups. Every known world gets an entry.
    ///
    /// Team IDs are mapped to the world they stand in for. Returns the map and
    /// the number of distinct known worlds the matchups reported.
    pub fn from_matchups(matchups: &[Matchup], known: &[WorldId]) -> (Self, usize) {
        let mut links: HashMap<WorldId, BTreeSet<WorldId>> =
            known.iter().map(|id| (*id, BTreeSet::new())).collect();
        let mut seen = BTreeSet::new();

        for matchup in matchups {
            for side in &matchup.sides {
                let side: BTreeSet<WorldId> = side.iter().copied().map(canonical_world).collect();
                for world in &side {
                    let others = side.iter().filter(|other| *other != world).copied();
                    links.entry(*world).or_default().extend(others);
                }
                seen.extend(side);
            }
        }

        let found = known.iter().filter(|id| seen.contains(*id)).count();
        let end_time = matchups.iter().filter_map(|m| m.end_time).min();
        (Self { links, end_time }, found)
    }

    /// Worlds linked with `world`
    pub fn links(&self, world: WorldId) -> BTreeSet<WorldId> {
        self.links.get(&world).cloned().unwrap_or_default()
    }

    /// Earliest end time among the matchups
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }
}

/// What one synchronization did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The map was replaced
    Applied {
        /// Known worlds covered
        found: usize,
        /// Earliest matchup end
        end_time: Option<DateTime<Utc>>,
    },
    /// Too few worlds were reported; nothing changed
    Incomplete {
        /// Known worlds covered
        found: usize,
        /// Known worlds required
        expected: usize,
    },
}

/// The synchronizer
pub struct WorldLinks {
    api: Arc<dyn GameApi>,
    known: Vec<WorldId>,
    current: RwLock<Option<Arc<LinkedWorlds>>>,
    synced: watch::Sender<bool>,
    min_delay: Duration,
    fallback_delay: Duration,
}

impl WorldLinks {
    /// Create an unsynchronized instance covering every known world
    pub fn new(api: Arc<dyn GameApi>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            api,
            known: known_worlds(),
            current: RwLock::new(None),
            synced,
            min_delay: MIN_REFRESH_DELAY,
            fallback_delay: FALLBACK_REFRESH_DELAY,
        }
    }

    /// Restrict the set of worlds a sync must cover
    pub fn with_known_worlds(mut self, known: impl IntoIterator<Item = WorldId>) -> Self {
        let known: BTreeSet<WorldId> = known.into_iter().collect();
        self.known = known.into_iter().collect();
        self
    }

    /// Override the refresh delays
    pub fn with_delays(mut self, min_delay: Duration, fallback_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.fallback_delay = fallback_delay;
        self
    }

    /// Whether a complete matchup has been loaded
    pub fn is_synchronized(&self) -> bool {
        self.current.read().is_some()
    }

    /// Wait until the first complete matchup is loaded
    pub async fn synchronized(&self) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|synced| *synced).await;
    }

    /// Current snapshot of the map
    pub fn snapshot(&self) -> WorldResult<Arc<LinkedWorlds>> {
        self.current.read().clone().ok_or(WorldError::NotSynchronized)
    }

    /// Worlds linked with `world`
    pub fn links(&self, world: WorldId) -> WorldResult<BTreeSet<WorldId>> {
        Ok(self.snapshot()?.links(world))
    }

    /// Fetch matchups once and apply them if they cover every known world
    pub async fn sync_once(&self) -> WorldResult<SyncOutcome> {
        let matchups = self.api.regional_matchups().await?;
        let (linked, found) = LinkedWorlds::from_matchups(&matchups, &self.known);
        let expected = self.known.len();

        if matchups.is_empty() || found < expected {
            tracing::warn!(found, expected, "not updating linked worlds, matchups incomplete");
            return Ok(SyncOutcome::Incomplete { found, expected });
        }

        let end_time = linked.end_time();
        *self.current.write() = Some(Arc::new(linked));
        self.synced.send_replace(true);
        tracing::info!(found, ?end_time, "updated linked worlds");
        Ok(SyncOutcome::Applied { found, end_time })
    }

    /// Delay until the next refresh as seen at `now`
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        let end_time = self.current.read().as_ref().and_then(|l| l.end_time());
        match end_time {
            Some(end) => (end - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(self.min_delay),
            None => self.fallback_delay,
        }
    }

    /// Refresh forever
    pub async fn run(self: Arc<Self>) {
        loop {
            tracing::info!("synchronizing linked worlds");
            if let Err(e) = self.sync_once().await {
                tracing::error!(error = %e, "unable to synchronize matchups");
            }

            let delay = self.next_delay(Utc::now());
            tracing::info!(?delay, "next linked world synchronization scheduled");
            tokio::time::sleep(delay).await;
        }
    }

    /// Start the refresh loop on the runtime
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGameApi;
    use chrono::TimeZone;

    fn w(ids: &[u32]) -> Vec<WorldId> {
        ids.iter().copied().map(WorldId).collect()
    }

    fn set(ids: &[u32]) -> BTreeSet<WorldId> {
        ids.iter().copied().map(WorldId).collect()
    }

    fn links_for(api: &Arc<MockGameApi>, known: &[u32]) -> WorldLinks {
        WorldLinks::new(api.clone()).with_known_worlds(w(known))
    }

    #[test]
    fn test_world_table() {
        assert_eq!(WORLDS.len(), 51);
        assert_eq!(world_name(WorldId(2003)), Some("Gandara"));
        assert_eq!(world_name(WorldId(12003)), Some("Silent Woods"));
        assert_eq!(world_name(WorldId(9999)), None);
        assert!(TEAMS.iter().all(|t| WORLDS.iter().any(|w| w.id == t.world)));
    }

    #[test]
    fn test_team_ids_map_to_worlds() {
        assert_eq!(canonical_world(WorldId(12003)), WorldId(2003));
        assert_eq!(canonical_world(WorldId(2003)), WorldId(2003));

        let matchup = Matchup::new([w(&[12003, 2105]), w(&[]), w(&[])], None);
        let (linked, found) = LinkedWorlds::from_matchups(&[matchup], &w(&[2003, 2105]));
        assert_eq!(found, 2);
        assert_eq!(linked.links(WorldId(2003)), set(&[2105]));
    }

    #[tokio::test]
    async fn test_links_before_sync_fail() {
        let api = Arc::new(MockGameApi::new());
        let links = links_for(&api, &[1, 2, 3]);
        assert!(matches!(links.links(WorldId(1)), Err(WorldError::NotSynchronized)));
        assert!(!links.is_synchronized());
    }

    #[tokio::test]
    async fn test_full_sync_builds_symmetric_links() {
        let api = Arc::new(MockGameApi::new());
        api.set_matchups(vec![Matchup::new([w(&[1, 2]), w(&[3]), w(&[4, 5, 6])], None)]);
        let links = links_for(&api, &[1, 2, 3, 4, 5, 6]);

        let outcome = links.sync_once().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Applied { found: 6, .. }));

        assert_eq!(links.links(WorldId(1)).unwrap(), set(&[2]));
        assert_eq!(links.links(WorldId(2)).unwrap(), set(&[1]));
        assert!(links.links(WorldId(3)).unwrap().is_empty());
        assert_eq!(links.links(WorldId(5)).unwrap(), set(&[4, 6]));
        assert!(!links.links(WorldId(5)).unwrap().contains(&WorldId(5)));
    }

    #[tokio::test]
    async fn test_incomplete_sync_is_discarded() {
        let api = Arc::new(MockGameApi::new());
        api.set_matchups(vec![Matchup::new([w(&[1]), w(&[2]), w(&[])], None)]);
        let links = links_for(&api, &[1, 2, 3]);

        let outcome = links.sync_once().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Incomplete { found: 2, expected: 3 });
        assert!(!links.is_synchronized());

        api.set_matchups(vec![Matchup::new([w(&[1, 2]), w(&[3]), w(&[])], None)]);
        links.sync_once().await.unwrap();
        api.set_matchups(vec![Matchup::new([w(&[1]), w(&[2, 3]), w(&[])], None)]);
        links.sync_once().await.unwrap();
        // Complete again, so replaced wholesale.
        assert_eq!(links.links(WorldId(3)).unwrap(), set(&[2]));

        api.set_matchups(vec![Matchup::new([w(&[1, 3]), w(&[]), w(&[])], None)]);
        links.sync_once().await.unwrap();
        // Incomplete: last known good map stays.
        assert_eq!(links.links(WorldId(3)).unwrap(), set(&[2]));
    }

    #[tokio::test]
    async fn test_repeated_and_unknown_worlds_do_not_count() {
        let api = Arc::new(MockGameApi::new());
        api.set_matchups(vec![Matchup::new([w(&[1, 1]), w(&[99]), w(&[])], None)]);
        let links = links_for(&api, &[1, 2, 3]);

        let outcome = links.sync_once().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Incomplete { found: 1, expected: 3 });
        assert!(!links.is_synchronized());
        assert!(matches!(links.links(WorldId(2)), Err(WorldError::NotSynchronized)));

        api.set_matchups(vec![Matchup::new([w(&[1, 2, 2]), w(&[3, 99]), w(&[])], None)]);
        let outcome = links.sync_once().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Applied { found: 3, .. }));
        assert_eq!(links.links(WorldId(2)).unwrap(), set(&[1]));
        assert_eq!(links.links(WorldId(3)).unwrap(), set(&[99]));
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_state() {
        let api = Arc::new(MockGameApi::new());
        api.fail_matchups(true);
        let links = links_for(&api, &[1]);
        assert!(matches!(links.sync_once().await, Err(WorldError::Fetch(_))));
        assert!(!links.is_synchronized());
    }

    #[tokio::test]
    async fn test_next_delay() {
        let now = Utc.with_ymd_and_hms(2024, 1, 12, 12, 0, 0).unwrap();
        let api = Arc::new(MockGameApi::new());
        let links = links_for(&api, &[1, 2]);
        assert_eq!(links.next_delay(now), FALLBACK_REFRESH_DELAY);

        let soon = now + chrono::Duration::hours(2);
        let later = now + chrono::Duration::hours(30);
        api.set_matchups(vec![
            Matchup::new([w(&[1]), w(&[]), w(&[])], Some(later)),
            Matchup::new([w(&[2]), w(&[]), w(&[])], Some(soon)),
        ]);
        links.sync_once().await.unwrap();
        assert_eq!(links.snapshot().unwrap().end_time(), Some(soon));
        assert_eq!(links.next_delay(now), Duration::from_secs(2 * 3600));

        // Overdue matchup waits the minimum.
        assert_eq!(links.next_delay(soon + chrono::Duration::minutes(10)), MIN_REFRESH_DELAY);
        assert_eq!(links.next_delay(soon - chrono::Duration::seconds(5)), MIN_REFRESH_DELAY);
    }

    #[tokio::test]
    async fn test_synchronized_resolves_after_first_sync() {
        let api = Arc::new(MockGameApi::new());
        api.set_matchups(vec![Matchup::new([w(&[1]), w(&[]), w(&[])], None)]);
        let links = Arc::new(links_for(&api, &[1]));

        let waiter = {
            let links = links.clone();
            tokio::spawn(async move { links.synchronized().await })
        };
        links.sync_once().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
