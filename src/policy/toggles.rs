//! Global policy toggles
//!
//! Live values of the universal switches. Collaborators flip them at any
//! time; the evaluator reads them with relaxed atomics and writes only one
//! of them (background blocking is switched off when the foreground signal
//! is found broken).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::info;

use crate::config::{OperatingMode, TogglesConfig};

/// One global switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toggle {
    /// Block flows whose owner is unknown
    BlockUnknownApps,
    /// Hold flows of never-seen apps until classified
    BlockNewlyInstalled,
    /// Flows use all underlying networks
    UseMultipleNetworks,
    /// OS always-on lockdown is active
    VpnLockdown,
    /// Block flows on metered networks
    BlockMetered,
    /// Block everything not explicitly allowed
    UniversalLockdown,
    /// Block port 80
    BlockHttp,
    /// Block while the device is locked
    BlockWhenLocked,
    /// Block UDP
    BlockUdp,
    /// Block background apps
    BlockBackground,
    /// Block flows that skipped the tunnel resolver
    DisallowDnsBypass,
    /// Trap port-53 traffic into the tunnel resolver
    PreventDnsLeaks,
    /// Cache DNS responses
    DnsCache,
}

impl Toggle {
    /// Every toggle, in storage order
    pub const ALL: [Self; 13] = [
        Self::BlockUnknownApps,
        Self::BlockNewlyInstalled,
        Self::UseMultipleNetworks,
        Self::VpnLockdown,
        Self::BlockMetered,
        Self::UniversalLockdown,
        Self::BlockHttp,
        Self::BlockWhenLocked,
        Self::BlockUdp,
        Self::BlockBackground,
        Self::DisallowDnsBypass,
        Self::PreventDnsLeaks,
        Self::DnsCache,
    ];

    /// Configuration name of the toggle
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BlockUnknownApps => "block_unknown_apps",
            Self::BlockNewlyInstalled => "block_newly_installed",
            Self::UseMultipleNetworks => "use_multiple_networks",
            Self::VpnLockdown => "vpn_lockdown",
            Self::BlockMetered => "block_metered",
            Self::UniversalLockdown => "universal_lockdown",
            Self::BlockHttp => "block_http",
            Self::BlockWhenLocked => "block_when_locked",
            Self::BlockUdp => "block_udp",
            Self::BlockBackground => "block_background",
            Self::DisallowDnsBypass => "disallow_dns_bypass",
            Self::PreventDnsLeaks => "prevent_dns_leaks",
            Self::DnsCache => "dns_cache",
        }
    }

    /// Look a toggle up by configuration name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == s)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, atomically mutable toggle set plus the operating mode
#[derive(Debug)]
pub struct GlobalToggles {
    flags: [AtomicBool; Toggle::ALL.len()],
    mode: AtomicU8,
}

impl Default for GlobalToggles {
    fn default() -> Self {
        Self::from_config(&TogglesConfig::default(), OperatingMode::default())
    }
}

impl GlobalToggles {
    /// Seed toggles from configuration
    #[must_use]
    pub fn from_config(config: &TogglesConfig, mode: OperatingMode) -> Self {
        let toggles = Self {
            flags: std::array::from_fn(|_| AtomicBool::new(false)),
            mode: AtomicU8::new(mode.as_u8()),
        };
        toggles.apply(config);
        toggles
    }

    /// Overwrite every toggle from configuration
    pub fn apply(&self, config: &TogglesConfig) {
        let values = [
            config.block_unknown_apps,
            config.block_newly_installed,
            config.use_multiple_networks,
            config.vpn_lockdown,
            config.block_metered,
            config.universal_lockdown,
            config.block_http,
            config.block_when_locked,
            config.block_udp,
            config.block_background,
            config.disallow_dns_bypass,
            config.prevent_dns_leaks,
            config.dns_cache,
        ];
        for (toggle, value) in Toggle::ALL.into_iter().zip(values) {
            self.flags[toggle.index()].store(value, Ordering::Relaxed);
        }
    }

    /// Current value of a toggle
    #[must_use]
    pub fn get(&self, toggle: Toggle) -> bool {
        self.flags[toggle.index()].load(Ordering::Relaxed)
    }

    /// Set a toggle
    pub fn set(&self, toggle: Toggle, value: bool) {
        let old = self.flags[toggle.index()].swap(value, Ordering::Relaxed);
        if old != value {
            info!("toggle {} changed: {} -> {}", toggle, old, value);
        }
    }

    /// Current operating mode
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    /// Switch operating mode
    pub fn set_mode(&self, mode: OperatingMode) {
        let old = OperatingMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::Relaxed));
        if old != mode {
            info!("operating mode changed: {} -> {}", old, mode);
        }
    }

    /// Current values as configuration
    #[must_use]
    pub fn snapshot(&self) -> TogglesConfig {
        TogglesConfig {
            block_unknown_apps: self.get(Toggle::BlockUnknownApps),
            block_newly_installed: self.get(Toggle::BlockNewlyInstalled),
            use_multiple_networks: self.get(Toggle::UseMultipleNetworks),
            vpn_lockdown: self.get(Toggle::VpnLockdown),
            block_metered: self.get(Toggle::BlockMetered),
            universal_lockdown: self.get(Toggle::UniversalLockdown),
            block_http: self.get(Toggle::BlockHttp),
            block_when_locked: self.get(Toggle::BlockWhenLocked),
            block_udp: self.get(Toggle::BlockUdp),
            block_background: self.get(Toggle::BlockBackground),
            disallow_dns_bypass: self.get(Toggle::DisallowDnsBypass),
            prevent_dns_leaks: self.get(Toggle::PreventDnsLeaks),
            dns_cache: self.get(Toggle::DnsCache),
        }
    }
}
