//! Sample configuration written by `--gen-config`

use std::path::Path;

/// Commented sample config
pub const SAMPLE_CONFIG: &str = include_str!("../templates/config.yaml");

/// Write the sample to `path`, creating parent directories
pub fn write_sample(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2sync_core::config::{Config, IpType};

    #[test]
    fn sample_is_a_valid_config() {
        let config = Config::from_yaml_str(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.dcdn.region, "ap-southeast-1");
        assert_eq!(config.firewall.region, "ap-southeast-1");
        assert!(config.dcdn.explicit_keys().is_none());
        assert_eq!(config.scheduler.cron_expression(), Some("0 0 2 * * 0,3"));
        assert!(config.scheduler.run_on_start);

        let groups = &config.sync.address_groups;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_name, "dcdn-source-ips-v4");
        assert_eq!(groups[0].ip_type, IpType::Ipv4);
        assert!(groups[0].exclude_patterns.contains(&"10.*".to_string()));
    }

    #[test]
    fn sample_cron_parses() {
        let config = Config::from_yaml_str(SAMPLE_CONFIG).unwrap();
        let cron = config.scheduler.cron_expression().unwrap();
        assert!(l2sync_core::CronSchedule::parse(cron).is_ok());
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("config.yaml");

        write_sample(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, SAMPLE_CONFIG);
        assert!(Config::load(&path).is_ok());
    }
}
