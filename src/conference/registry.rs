//! The process-wide registry of live conferences.
//!
//! Conferences are keyed by conference number in a concurrent map; creation
//! is atomic through the map's entry API, so two racing admissions to the
//! same new room observe one conference and one mixer allocation.

use super::{Conference, ConferenceSummary};
use crate::{
    channel::{NullPromptPlayer, PromptPlayer},
    config::Config,
    constants::EMPTY_SCAN_LIMIT,
    error::{Error, Result},
    events::EventBus,
    mixer::{BufferInfo, ConfInfo, ConfMode, MixerDevice, MixerPort, CREATE_CONF_ID},
    rooms::Rooms,
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns every live conference and the device handle used to build new ones.
pub struct Registry {
    confs: DashMap<String, Arc<Conference>>,
    device: Arc<dyn MixerDevice>,
    player: Arc<dyn PromptPlayer>,
    bus: EventBus,
    config: Config,
}

impl Registry {
    /// Creates a registry over the given mixer device.
    #[must_use]
    pub fn new(device: Arc<dyn MixerDevice>, config: Config) -> Self {
        Self {
            confs: DashMap::new(),
            device,
            player: Arc::new(NullPromptPlayer),
            bus: EventBus::disabled(),
            config,
        }
    }

    /// Sets the management event bus for all conferences built afterwards.
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Sets the in-band prompt player for all conferences built afterwards.
    #[must_use]
    pub fn with_prompt_player(mut self, player: Arc<dyn PromptPlayer>) -> Self {
        self.player = player;
        self
    }

    /// The registry's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Looks up a live conference.
    #[must_use]
    pub fn find(&self, confno: &str) -> Option<Arc<Conference>> {
        self.confs.get(confno).map(|e| Arc::clone(e.value()))
    }

    /// Looks up a conference, creating it when `make` or `dynamic` allows.
    ///
    /// On creation, a pseudo port is opened and bound as the room's
    /// announcement channel; the mixer's id for the room is recorded for the
    /// conference's lifetime. A device that cannot be opened or refuses the
    /// binding fails the build with [`Error::OutOfResource`] and leaves the
    /// registry unchanged.
    pub fn find_or_build(
        &self,
        confno: &str,
        pin: &str,
        admin_pin: &str,
        make: bool,
        dynamic: bool,
    ) -> Result<Option<Arc<Conference>>> {
        match self.confs.entry(confno.to_string()) {
            Entry::Occupied(e) => Ok(Some(Arc::clone(e.get()))),
            Entry::Vacant(slot) => {
                if !make && !dynamic {
                    return Ok(None);
                }
                let conf = Arc::new(self.build(confno, pin, admin_pin, dynamic)?);
                slot.insert(Arc::clone(&conf));
                Ok(Some(conf))
            }
        }
    }

    fn build(&self, confno: &str, pin: &str, admin_pin: &str, dynamic: bool) -> Result<Conference> {
        let mut port = self.device.open_pseudo().map_err(|e| {
            warn!("unable to open pseudo port for conference {}: {}", confno, e);
            Error::OutOfResource
        })?;
        port.set_linear(true).map_err(|e| {
            warn!("unable to set linear mode for conference {}: {}", confno, e);
            Error::OutOfResource
        })?;
        let bound = port
            .set_conf(ConfInfo {
                channel: 0,
                conf_id: CREATE_CONF_ID,
                mode: ConfMode::CONF_ANNOUNCE | ConfMode::CONF_ANNOUNCE_MONITOR,
            })
            .map_err(|e| {
                warn!("error setting conference for '{}': {}", confno, e);
                Error::OutOfResource
            })?;
        debug!(
            "created mixer conference {} for conference '{}'",
            bound.conf_id, confno
        );
        Ok(Conference::new(
            confno.to_string(),
            pin.to_string(),
            admin_pin.to_string(),
            dynamic,
            bound.conf_id,
            port,
            Arc::clone(&self.player),
            self.bus.clone(),
        ))
    }

    /// Opens and configures a pseudo port for a participant session.
    pub(crate) fn open_session_port(&self) -> Result<Box<dyn MixerPort>> {
        let mut port = self.device.open_pseudo().map_err(Error::Device)?;
        port.set_buffering(BufferInfo::default())?;
        port.set_linear(true)?;
        Ok(port)
    }

    /// Removes a conference from the registry once it is empty.
    ///
    /// If a recorder is attached it is asked to stop and this call blocks
    /// (briefly) until the recorder confirms; the mixer binding is released
    /// when the last `Arc<Conference>` drops.
    pub fn reap_if_empty(&self, conf: &Arc<Conference>) {
        let removed = self
            .confs
            .remove_if(conf.confno(), |_, c| c.user_count() == 0 && c.auto_destroy());
        if removed.is_some() {
            conf.stop_recorder_blocking();
            debug!("destroyed conference '{}'", conf.confno());
        }
    }

    /// All live conferences, ordered by conference number.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Conference>> {
        let mut confs: Vec<_> = self
            .confs
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        confs.sort_by(|a, b| a.confno().cmp(b.confno()));
        confs
    }

    /// CLI summaries for every live conference.
    #[must_use]
    pub fn summaries(&self) -> Vec<ConferenceSummary> {
        self.snapshot().iter().map(|c| c.summary()).collect()
    }

    /// Picks the first usable empty conference number.
    ///
    /// Statically configured rooms are preferred (skipping PIN-protected
    /// ones when `no_pin` is set); with `dynamic`, any number below the scan
    /// limit that is not in use qualifies.
    #[must_use]
    pub fn next_empty(&self, rooms: &Rooms, dynamic: bool, no_pin: bool) -> Option<String> {
        let mut used = vec![false; EMPTY_SCAN_LIMIT as usize];
        for entry in self.confs.iter() {
            if let Ok(n) = entry.key().parse::<u32>() {
                if n < EMPTY_SCAN_LIMIT {
                    used[n as usize] = true;
                }
            }
        }

        if no_pin || !dynamic {
            for room in rooms.iter() {
                if let Ok(n) = room.confno.parse::<u32>() {
                    if n < EMPTY_SCAN_LIMIT && no_pin && !room.is_pinless() {
                        used[n as usize] = true;
                    }
                }
                if !dynamic
                    && !self.confs.contains_key(&room.confno)
                    && (!no_pin || room.is_pinless())
                {
                    return Some(room.confno.clone());
                }
            }
        }

        if dynamic {
            return used
                .iter()
                .position(|in_use| !in_use)
                .map(|n| n.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testutil::ScriptedCall;
    use crate::mixer::testutil::TestMixer;
    use crate::participant::ConfFlags;

    fn registry() -> (Registry, TestMixer) {
        let mixer = TestMixer::new();
        let registry = Registry::new(Arc::new(mixer.clone()), Config::default());
        (registry, mixer)
    }

    #[test]
    fn lookup_without_create_flags_builds_nothing() {
        let (registry, mixer) = registry();
        assert!(registry
            .find_or_build("1000", "", "", false, false)
            .unwrap()
            .is_none());
        assert_eq!(mixer.port_count(), 0);
        assert!(registry.find("1000").is_none());
    }

    #[test]
    fn dynamic_create_binds_an_announce_port() {
        let (registry, mixer) = registry();
        let conf = registry
            .find_or_build("1000", "", "", false, true)
            .unwrap()
            .unwrap();
        assert!(conf.is_dynamic());
        assert!(conf.mixer_id() > 0);
        let mode = mixer.port(0).binding().mode;
        assert!(mode.contains(ConfMode::CONF_ANNOUNCE | ConfMode::CONF_ANNOUNCE_MONITOR));
        assert!(mixer.port(0).is_linear());

        // Same key resolves to the same conference, no second allocation.
        let again = registry
            .find_or_build("1000", "", "", true, false)
            .unwrap()
            .unwrap();
        assert_eq!(again.mixer_id(), conf.mixer_id());
        assert_eq!(mixer.port_count(), 1);
    }

    #[test]
    fn device_failure_leaves_registry_unchanged() {
        let (registry, mixer) = registry();
        mixer.fail_next_opens(1);
        assert!(matches!(
            registry.find_or_build("1000", "", "", true, false),
            Err(Error::OutOfResource)
        ));
        assert!(registry.find("1000").is_none());

        // A later attempt succeeds cleanly.
        assert!(registry
            .find_or_build("1000", "", "", true, false)
            .unwrap()
            .is_some());
    }

    #[test]
    fn reap_removes_only_empty_conferences() {
        let (registry, _mixer) = registry();
        let conf = registry
            .find_or_build("1000", "", "", false, true)
            .unwrap()
            .unwrap();

        let call = ScriptedCall::new("TEST/a-1", "1.1");
        let p = conf.admit(&call, ConfFlags::empty());
        registry.reap_if_empty(&conf);
        assert!(registry.find("1000").is_some(), "occupied room must survive");

        conf.remove(p.user_no(), false);
        registry.reap_if_empty(&conf);
        assert!(registry.find("1000").is_none());
    }

    #[test]
    fn empty_scan_prefers_static_rooms_then_dynamic_numbers() {
        let (registry, _mixer) = registry();
        let rooms = Rooms::parse("[rooms]\nconf => 0,55\nconf => 1\n");

        // Static preference: first unoccupied room, honoring no_pin.
        assert_eq!(
            registry.next_empty(&rooms, false, false),
            Some("0".to_string())
        );
        assert_eq!(
            registry.next_empty(&rooms, false, true),
            Some("1".to_string())
        );

        // Dynamic scan: pinned static room 0 is unavailable under no_pin,
        // and room 1 is live, so 2 is the first free number.
        registry
            .find_or_build("1", "", "", false, true)
            .unwrap()
            .unwrap();
        assert_eq!(
            registry.next_empty(&rooms, true, true),
            Some("2".to_string())
        );
    }
}
