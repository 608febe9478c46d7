//! Zone name <-> numeric zone ID translation
//!
//! Vendor records carry zone names (`ap-guangzhou-3`) while topology labels
//! carry numeric IDs (`100003`). A zone ID is the region's base ID plus the
//! zone ordinal, which must stay within `1..1000`.

use std::collections::BTreeMap;

const MAX_ZONE_ORDINAL: u32 = 1000;

/// Bijective zone name/ID lookup
pub trait ZoneResolver: Send + Sync {
    fn id_from_zone(&self, zone: &str) -> Option<String>;
    fn zone_from_id(&self, id: &str) -> Option<String>;
}

/// Region-prefix table of base zone IDs
#[derive(Debug, Clone)]
pub struct ZoneTable {
    regions: BTreeMap<String, u32>,
}

const DEFAULT_REGIONS: &[(&str, u32)] = &[
    ("ap-guangzhou", 100000),
    ("ap-shenzhen-fsi", 110000),
    ("ap-guangzhou-open", 120000),
    ("na-siliconvalley", 150000),
    ("ap-chengdu", 160000),
    ("eu-frankfurt", 170000),
    ("ap-seoul", 180000),
    ("ap-chongqing", 190000),
    ("ap-shanghai", 200000),
    ("ap-mumbai", 210000),
    ("na-ashburn", 220000),
    ("ap-bangkok", 230000),
    ("ap-tokyo", 250000),
    ("ap-hongkong", 300000),
    ("ap-jinan-ec", 310000),
    ("ap-hangzhou-ec", 320000),
    ("ap-nanjing", 330000),
    ("ap-fuzhou-ec", 340000),
    ("ap-wuhan-ec", 350000),
    ("ap-tianjin", 360000),
    ("ap-shenzhen", 370000),
    ("ap-taipei", 390000),
    ("na-toronto", 400000),
    ("ap-changsha-ec", 450000),
    ("ap-beijing-fsi", 460000),
    ("ap-shijiazhuang-ec", 530000),
    ("ap-qingyuan", 540000),
    ("ap-hefei-ec", 550000),
    ("ap-shenyang-ec", 560000),
    ("ap-xian-ec", 570000),
    ("ap-xibei-ec", 580000),
    ("ap-shanghai-fsi", 700000),
    ("ap-zhengzhou-ec", 710000),
    ("ap-jakarta", 720000),
    ("sa-saopaulo", 740000),
    ("ap-shanghai-adc", 780000),
    ("ap-beijing", 800000),
    ("ap-guangzhou-wxzf", 820000),
    ("ap-shanghai-wxzf", 830000),
    ("ap-singapore", 900000),
];

impl Default for ZoneTable {
    fn default() -> Self {
        Self::new(DEFAULT_REGIONS.iter().map(|(r, id)| (r.to_string(), *id)))
    }
}

impl ZoneTable {
    pub fn new(regions: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
        }
    }
}

impl ZoneResolver for ZoneTable {
    fn id_from_zone(&self, zone: &str) -> Option<String> {
        let (region, ordinal) = zone.rsplit_once('-')?;
        let ordinal: u32 = ordinal.parse().ok()?;
        if ordinal == 0 || ordinal >= MAX_ZONE_ORDINAL {
            return None;
        }
        let base = self.regions.get(region)?;
        Some(base.checked_add(ordinal)?.to_string())
    }

    fn zone_from_id(&self, id: &str) -> Option<String> {
        let id: u32 = id.parse().ok()?;
        self.regions
            .iter()
            .find(|(_, base)| id > **base && id < base.saturating_add(MAX_ZONE_ORDINAL))
            .map(|(region, base)| format!("{}-{}", region, id - base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_to_id() {
        let table = ZoneTable::default();
        assert_eq!(table.id_from_zone("ap-guangzhou-3").as_deref(), Some("100003"));
        assert_eq!(table.id_from_zone("ap-shenzhen-fsi-2").as_deref(), Some("110002"));
        assert_eq!(table.id_from_zone("ap-singapore-1").as_deref(), Some("900001"));
    }

    #[test]
    fn test_id_to_zone() {
        let table = ZoneTable::default();
        assert_eq!(table.zone_from_id("100003").as_deref(), Some("ap-guangzhou-3"));
        assert_eq!(table.zone_from_id("110002").as_deref(), Some("ap-shenzhen-fsi-2"));
    }

    #[test]
    fn test_unresolvable_zones() {
        let table = ZoneTable::default();
        assert!(table.id_from_zone("mars-central-1").is_none());
        assert!(table.id_from_zone("ap-guangzhou").is_none());
        assert!(table.id_from_zone("ap-guangzhou-0").is_none());
        assert!(table.zone_from_id("100000").is_none());
        assert!(table.zone_from_id("abc").is_none());
        assert!(table.zone_from_id("5").is_none());
    }

    #[test]
    fn test_round_trip_every_region() {
        let table = ZoneTable::default();
        for (region, _) in DEFAULT_REGIONS {
            for ordinal in [1, 7, 999] {
                let zone = format!("{region}-{ordinal}");
                let id = table.id_from_zone(&zone).unwrap();
                assert_eq!(table.zone_from_id(&id).unwrap(), zone);
            }
        }
    }
}
