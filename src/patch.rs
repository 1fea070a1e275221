//! Build the fixtures of a show against one DMX link.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use log::info;

use crate::config::{FixtureConfig, FixtureKind};
use crate::fixture::dimmer::DIMMER;
use crate::fixture::{DimmerFixture, MovingHead, NoPublish, Publish};
use crate::link::DmxLink;
use crate::profile::FixtureProfile;

/// Fixture name for every occupied DMX index.
type UsedAddrs = HashMap<usize, String>;

/// Factory for fixture instances.
///
/// Maintains a mapping of which DMX addresses are in use by which fixture, to
/// prevent addressing collisions. Profiles are loaded once per path.
pub struct Patch {
    link: Arc<DmxLink>,
    publisher: Arc<dyn Publish>,
    profiles: HashMap<PathBuf, Arc<FixtureProfile>>,
    used_addrs: UsedAddrs,
    moving_heads: Vec<(String, MovingHead)>,
    dimmers: Vec<(String, DimmerFixture)>,
}

impl Patch {
    pub fn new(link: Arc<DmxLink>) -> Self {
        Self {
            link,
            publisher: Arc::new(NoPublish),
            profiles: Default::default(),
            used_addrs: Default::default(),
            moving_heads: Default::default(),
            dimmers: Default::default(),
        }
    }

    /// Moving heads patched from now on notify this publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publish>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Patch every fixture in a show, loading profiles from disk.
    pub fn patch_all<'a>(
        &mut self,
        fixtures: impl IntoIterator<Item = &'a FixtureConfig>,
    ) -> Result<()> {
        for cfg in fixtures {
            self.patch(cfg)?;
        }
        Ok(())
    }

    /// Patch a single fixture, loading its profile from disk.
    pub fn patch(&mut self, cfg: &FixtureConfig) -> Result<()> {
        let profile = self
            .load_profile(&cfg.profile)
            .with_context(|| format!("patching {}", cfg.name))?;
        self.patch_with_profile(cfg, profile)
    }

    /// Patch a single fixture using an already loaded profile.
    pub fn patch_with_profile(
        &mut self,
        cfg: &FixtureConfig,
        profile: Arc<FixtureProfile>,
    ) -> Result<()> {
        profile
            .validate()
            .with_context(|| format!("invalid profile for {}", cfg.name))?;
        ensure!(
            !self.contains(&cfg.name),
            "duplicate fixture name {}",
            cfg.name
        );
        let channel_count = profile.channel.max(profile.max_offset());
        cfg.addr
            .validate_block(channel_count)
            .with_context(|| format!("patching {}", cfg.name))?;
        self.used_addrs = self.check_collision(cfg, channel_count)?;

        info!(
            "Controlling {} ({} {}) at {}.",
            cfg.name, cfg.kind, profile.name, cfg.addr
        );
        match cfg.kind {
            FixtureKind::MovingHead => {
                let mut head = MovingHead::new(profile, self.link.clone(), cfg.addr)
                    .with_placement(cfg.position(), cfg.mounting())
                    .with_publisher(self.publisher.clone());
                if cfg.pan_flipped {
                    head.set_pan_flipped(true);
                }
                if cfg.tilt_flipped {
                    head.set_tilt_flipped(true);
                }
                self.moving_heads.push((cfg.name.clone(), head));
            }
            FixtureKind::Dimmer => {
                ensure!(
                    profile.has_channel(DIMMER),
                    "profile {} has no {DIMMER} channel",
                    profile.name
                );
                let dimmer = DimmerFixture::new(profile, self.link.clone(), cfg.addr);
                self.dimmers.push((cfg.name.clone(), dimmer));
            }
        }
        Ok(())
    }

    fn load_profile(&mut self, path: &Path) -> Result<Arc<FixtureProfile>> {
        if let Some(profile) = self.profiles.get(path) {
            return Ok(profile.clone());
        }
        let profile = Arc::new(FixtureProfile::from_file(path)?);
        self.profiles.insert(path.to_path_buf(), profile.clone());
        Ok(profile)
    }

    /// Check that the fixture doesn't conflict with another patched fixture.
    /// Return an updated collection of used addresses if it does not conflict.
    fn check_collision(&self, cfg: &FixtureConfig, channel_count: usize) -> Result<UsedAddrs> {
        let mut used_addrs = self.used_addrs.clone();
        let dmx_index = cfg.addr.dmx_index();
        for addr in dmx_index..dmx_index + channel_count {
            match used_addrs.get(&addr) {
                Some(existing) => {
                    bail!(
                        "{} at {} overlaps at DMX address {} with {existing}.",
                        cfg.name,
                        cfg.addr,
                        addr + 1,
                    );
                }
                None => {
                    used_addrs.insert(addr, cfg.name.clone());
                }
            }
        }
        Ok(used_addrs)
    }

    fn contains(&self, name: &str) -> bool {
        self.moving_heads.iter().any(|(n, _)| n == name)
            || self.dimmers.iter().any(|(n, _)| n == name)
    }

    pub fn link(&self) -> &Arc<DmxLink> {
        &self.link
    }

    pub fn len(&self) -> usize {
        self.moving_heads.len() + self.dimmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn moving_head_mut(&mut self, name: &str) -> Option<&mut MovingHead> {
        self.moving_heads
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, head)| head)
    }

    pub fn dimmer_mut(&mut self, name: &str) -> Option<&mut DimmerFixture> {
        self.dimmers
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, dimmer)| dimmer)
    }

    /// Iterate over all patched moving heads along with their names.
    pub fn moving_heads(&self) -> impl Iterator<Item = (&str, &MovingHead)> {
        self.moving_heads.iter().map(|(n, h)| (n.as_str(), h))
    }

    pub fn moving_heads_mut(&mut self) -> impl Iterator<Item = &mut MovingHead> {
        self.moving_heads.iter_mut().map(|(_, h)| h)
    }

    pub fn dimmers(&self) -> impl Iterator<Item = (&str, &DimmerFixture)> {
        self.dimmers.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn dimmers_mut(&mut self) -> impl Iterator<Item = &mut DimmerFixture> {
        self.dimmers.iter_mut().map(|(_, d)| d)
    }

    /// Black out every fixture and park every moving head at its center.
    pub fn home_all(&mut self) {
        for head in self.moving_heads_mut() {
            head.home();
        }
        for dimmer in self.dimmers_mut() {
            dimmer.set_dimmer(0.);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dmx::DmxAddr;
    use crate::link::mock::idle_link;
    use crate::profile::test::{SPOT_PROFILE, WASH_PROFILE};

    const DIMMER_PROFILE: &str = "{name: Dimmer, channel: 1, mapping: {dimmer: 1}}";

    fn cfg(name: &str, kind: FixtureKind, addr: usize) -> FixtureConfig {
        FixtureConfig {
            name: name.to_string(),
            profile: PathBuf::from(format!("{name}.yaml")),
            kind,
            addr: DmxAddr(addr),
            position: [0., 0., 0.],
            rotation: [0., 0., 0.],
            pan_flipped: false,
            tilt_flipped: false,
        }
    }

    fn profile(text: &str) -> Arc<FixtureProfile> {
        Arc::new(FixtureProfile::parse(text).unwrap())
    }

    fn patch() -> Patch {
        Patch::new(Arc::new(idle_link()))
    }

    fn add(
        patch: &mut Patch,
        name: &str,
        kind: FixtureKind,
        addr: usize,
        text: &str,
    ) -> Result<()> {
        patch.patch_with_profile(&cfg(name, kind, addr), profile(text))
    }

    #[test]
    fn test_ok_patch() -> Result<()> {
        let mut patch = patch();
        add(&mut patch, "spot", FixtureKind::MovingHead, 1, SPOT_PROFILE)?;
        add(&mut patch, "wash", FixtureKind::MovingHead, 17, WASH_PROFILE)?;
        add(&mut patch, "house", FixtureKind::Dimmer, 512, DIMMER_PROFILE)?;
        assert_eq!(3, patch.len());
        assert_eq!(2, patch.moving_heads().count());
        assert!(patch.moving_head_mut("wash").is_some());
        assert!(patch.dimmer_mut("house").is_some());
        assert!(patch.dimmer_mut("spot").is_none());
        Ok(())
    }

    #[test]
    fn test_overlap() -> Result<()> {
        let mut patch = patch();
        add(&mut patch, "spot", FixtureKind::MovingHead, 1, SPOT_PROFILE)?;
        let err = add(&mut patch, "house", FixtureKind::Dimmer, 16, DIMMER_PROFILE).unwrap_err();
        assert_eq!(
            "house at 16 overlaps at DMX address 16 with spot.",
            err.to_string()
        );
        // A failed patch leaves the address map untouched.
        add(&mut patch, "house", FixtureKind::Dimmer, 17, DIMMER_PROFILE)?;
        Ok(())
    }

    #[test]
    fn test_past_end_of_universe() {
        let mut patch = patch();
        assert!(add(&mut patch, "spot", FixtureKind::MovingHead, 500, SPOT_PROFILE).is_err());
        assert!(add(&mut patch, "spot", FixtureKind::MovingHead, 0, SPOT_PROFILE).is_err());
        assert!(patch.is_empty());
    }

    #[test]
    fn test_duplicate_name() -> Result<()> {
        let mut patch = patch();
        add(&mut patch, "a", FixtureKind::Dimmer, 1, DIMMER_PROFILE)?;
        assert!(add(&mut patch, "a", FixtureKind::Dimmer, 2, DIMMER_PROFILE).is_err());
        Ok(())
    }

    #[test]
    fn test_dimmer_needs_dimmer_channel() {
        let mut patch = patch();
        let fog = "{name: Fog, channel: 1, mapping: {fog: 1}}";
        assert!(add(&mut patch, "fog", FixtureKind::Dimmer, 1, fog).is_err());
    }

    #[test]
    fn test_flip_and_home() -> Result<()> {
        let mut patch = patch();
        let mut spot = cfg("spot", FixtureKind::MovingHead, 1);
        spot.pan_flipped = true;
        patch.patch_with_profile(&spot, profile(SPOT_PROFILE))?;
        add(&mut patch, "house", FixtureKind::Dimmer, 20, DIMMER_PROFILE)?;
        patch.dimmer_mut("house").unwrap().set_dimmer(1.);
        let head = patch.moving_head_mut("spot").unwrap();
        head.set_dimmer(1.);
        head.set_pan(0.);
        assert_eq!(255, patch.link().output_value(1));

        patch.home_all();
        assert_eq!(0, patch.link().output_value(6));
        assert_eq!(0, patch.link().output_value(20));
        // Flipped center is still the center.
        assert_eq!(127, patch.link().output_value(1));
        Ok(())
    }

    #[test]
    fn test_profiles_loaded_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dimmer.yaml");
        std::fs::write(&path, DIMMER_PROFILE)?;
        let mut patch = patch();
        for (name, addr) in [("a", 1), ("b", 2)] {
            let mut c = cfg(name, FixtureKind::Dimmer, addr);
            c.profile = path.clone();
            patch.patch(&c)?;
        }
        assert_eq!(1, patch.profiles.len());
        assert_eq!(2, patch.dimmers().count());
        Ok(())
    }

    #[test]
    fn test_missing_profile_file() {
        let mut patch = patch();
        let err = patch
            .patch(&cfg("nowhere", FixtureKind::Dimmer, 1))
            .unwrap_err();
        assert!(format!("{err:#}").starts_with("patching nowhere"));
    }
}
