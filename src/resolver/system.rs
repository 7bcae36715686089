//! Host metrics resolver backed by `sysinfo`
//!
//! Task names have the form `<category>[/<selector>[/<argument>]]`. The topic
//! wildcard (`*` unless configured otherwise) as selector returns every field
//! of the category, so such tasks are always requested on a wildcard topic.
//!
//! | task                              | value                         |
//! |-----------------------------------|-------------------------------|
//! | `cpu_percent`                     | overall CPU usage             |
//! | `cpu_percent/*`, `cpu_percent/N`  | per-core usage                |
//! | `cpu_count`                       | number of logical CPUs        |
//! | `virtual_memory/<field>`          | total, available, used, free, percent |
//! | `swap_memory/<field>`             | total, used, free, percent    |
//! | `load_average/<field>`            | one, five, fifteen            |
//! | `disk_usage/<field>/<mount>`      | total, used, free, percent    |
//! | `boot_time`, `uptime`             | seconds                       |
//! | `host_name`                       | text                          |

use super::{ResolveError, ValueResolver};
use crate::protocol::{Payload, DEFAULT_WILDCARD};
use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Disks, System};

/// Resolver reading live values from the host
pub struct SystemResolver {
    system: Mutex<System>,
    /// Selector returning every field of a category
    select_all: String,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::with_wildcard(DEFAULT_WILDCARD)
    }

    /// Resolver whose select-all selector is the topic wildcard `wildcard`
    pub fn with_wildcard(wildcard: char) -> Self {
        let mut system = System::new();
        // First CPU reading needs a baseline
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            select_all: wildcard.to_string(),
        }
    }

    fn with_system<T>(&self, read: impl FnOnce(&mut System) -> T) -> Result<T, ResolveError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| ResolveError::fault("System state lock poisoned"))?;
        Ok(read(&mut system))
    }

    fn cpu_percent(&self, task: &str, selector: &str) -> Result<Payload, ResolveError> {
        let (global, per_core) = self.with_system(|system| {
            system.refresh_cpu_usage();
            let per_core: Vec<f64> = system
                .cpus()
                .iter()
                .map(|cpu| round_tenth(f64::from(cpu.cpu_usage())))
                .collect();
            (round_tenth(f64::from(system.global_cpu_usage())), per_core)
        })?;

        match selector {
            "" => Ok(Payload::float(global)),
            all if all == self.select_all => Ok(Payload::Sequence(
                per_core.into_iter().map(Payload::float).collect(),
            )),
            index => index
                .parse::<usize>()
                .ok()
                .and_then(|i| per_core.get(i).copied())
                .map(Payload::float)
                .ok_or_else(|| ResolveError::unknown_task(task)),
        }
    }

    fn virtual_memory(&self, task: &str, selector: &str) -> Result<Payload, ResolveError> {
        let (total, available, used, free) = self.with_system(|system| {
            system.refresh_memory();
            (
                system.total_memory(),
                system.available_memory(),
                system.used_memory(),
                system.free_memory(),
            )
        })?;

        self.select_field(
            task,
            selector,
            vec![
                ("total", bytes(total)),
                ("available", bytes(available)),
                ("used", bytes(used)),
                ("free", bytes(free)),
                ("percent", Payload::float(percent(total - available.min(total), total))),
            ],
        )
    }

    fn swap_memory(&self, task: &str, selector: &str) -> Result<Payload, ResolveError> {
        let (total, used, free) = self.with_system(|system| {
            system.refresh_memory();
            (system.total_swap(), system.used_swap(), system.free_swap())
        })?;

        self.select_field(
            task,
            selector,
            vec![
                ("total", bytes(total)),
                ("used", bytes(used)),
                ("free", bytes(free)),
                ("percent", Payload::float(percent(used, total))),
            ],
        )
    }

    fn disk_usage(&self, task: &str, rest: &str) -> Result<Payload, ResolveError> {
        let (selector, mount) = rest.split_once('/').unwrap_or((rest, ""));
        let mount = if mount.is_empty() { "/" } else { mount };

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new(mount))
            .ok_or_else(|| ResolveError::fault(format!("Disk not found: {mount}")))?;

        let total = disk.total_space();
        let free = disk.available_space();
        let used = total.saturating_sub(free);

        self.select_field(
            task,
            selector,
            vec![
                ("total", bytes(total)),
                ("used", bytes(used)),
                ("free", bytes(free)),
                ("percent", Payload::float(percent(used, total))),
            ],
        )
    }
}

impl SystemResolver {
    /// Pick one field, or every field for the select-all selector
    fn select_field(
        &self,
        task: &str,
        selector: &str,
        fields: Vec<(&'static str, Payload)>,
    ) -> Result<Payload, ResolveError> {
        if selector == self.select_all {
            return Ok(Payload::mapping(fields));
        }

        fields
            .into_iter()
            .find(|(name, _)| *name == selector)
            .map(|(_, value)| value)
            .ok_or_else(|| ResolveError::unknown_task(task))
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueResolver for SystemResolver {
    fn resolve(&self, task: &str) -> Result<Payload, ResolveError> {
        let (category, rest) = task.split_once('/').unwrap_or((task, ""));

        match category {
            "cpu_percent" => self.cpu_percent(task, rest),
            "cpu_count" if rest.is_empty() => {
                let count = self.with_system(|system| {
                    if system.cpus().is_empty() {
                        system.refresh_cpu_usage();
                    }
                    system.cpus().len()
                })?;
                Ok(Payload::integer(count as i64))
            }
            "virtual_memory" => self.virtual_memory(task, rest),
            "swap_memory" => self.swap_memory(task, rest),
            "load_average" => {
                let load = System::load_average();
                self.select_field(
                    task,
                    rest,
                    vec![
                        ("one", Payload::float(load.one)),
                        ("five", Payload::float(load.five)),
                        ("fifteen", Payload::float(load.fifteen)),
                    ],
                )
            }
            "disk_usage" => self.disk_usage(task, rest),
            "boot_time" if rest.is_empty() => Ok(bytes(System::boot_time())),
            "uptime" if rest.is_empty() => Ok(bytes(System::uptime())),
            "host_name" if rest.is_empty() => System::host_name()
                .map(Payload::text)
                .ok_or_else(|| ResolveError::fault("Host name unavailable")),
            _ => Err(ResolveError::unknown_task(task)),
        }
    }
}

fn bytes(value: u64) -> Payload {
    Payload::integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_tenth(part as f64 * 100.0 / total as f64)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
