// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// PPE 合规判定
// 必备装备固定为 {helmet, vest, boots}; 检测器原始标签经 LabelMap 精确映射后参与比较

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::Detection;

/// 必备防护装备
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equipment {
    Helmet,
    Vest,
    Boots,
}

impl Equipment {
    pub const ALL: [Equipment; 3] = [Equipment::Helmet, Equipment::Vest, Equipment::Boots];

    /// 入场必须全部具备
    pub const REQUIRED: [Equipment; 3] = Self::ALL;

    pub fn as_str(&self) -> &'static str {
        match self {
            Equipment::Helmet => "helmet",
            Equipment::Vest => "vest",
            Equipment::Boots => "boots",
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown equipment `{0}` (expected helmet, vest or boots)")]
pub struct UnknownEquipment(pub String);

impl FromStr for Equipment {
    type Err = UnknownEquipment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helmet" => Ok(Equipment::Helmet),
            "vest" => Ok(Equipment::Vest),
            "boots" => Ok(Equipment::Boots),
            other => Err(UnknownEquipment(other.to_string())),
        }
    }
}

/// 检测器标签 → 装备 的映射表
///
/// 只做精确匹配: 大小写、拼写必须与模型词表完全一致, 不做任何归一化。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    aliases: BTreeMap<String, Equipment>,
}

impl Default for LabelMap {
    /// 英文词表 + 原 PPE 模型的西班牙语词表 (casco / chaleco / botas)
    fn default() -> Self {
        Self::from_aliases([
            ("helmet", Equipment::Helmet),
            ("vest", Equipment::Vest),
            ("boots", Equipment::Boots),
            ("casco", Equipment::Helmet),
            ("chaleco", Equipment::Vest),
            ("botas", Equipment::Boots),
        ])
    }
}

impl LabelMap {
    pub fn from_aliases<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (S, Equipment)>,
        S: Into<String>,
    {
        Self {
            aliases: aliases.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn insert(&mut self, label: impl Into<String>, equipment: Equipment) {
        self.aliases.insert(label.into(), equipment);
    }

    pub fn resolve(&self, label: &str) -> Option<Equipment> {
        self.aliases.get(label).copied()
    }

    pub fn aliases(&self) -> &BTreeMap<String, Equipment> {
        &self.aliases
    }
}

/// 单人合规结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceResult {
    /// 去重后的原始标签 (含与合规无关的标签, 如 gloves)
    pub detected: BTreeSet<String>,
    pub present: BTreeSet<Equipment>,
    pub missing: BTreeSet<Equipment>,
    pub passed: bool,
}

impl ComplianceResult {
    pub fn required() -> BTreeSet<Equipment> {
        Equipment::REQUIRED.into_iter().collect()
    }

    /// 缺失项, 形如 "helmet, boots"
    pub fn missing_list(&self) -> String {
        self.missing
            .iter()
            .map(Equipment::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// missing = REQUIRED − present; passed ⇔ missing 为空
pub fn check<'a, I>(labels: I, map: &LabelMap) -> ComplianceResult
where
    I: IntoIterator<Item = &'a str>,
{
    let detected: BTreeSet<String> = labels.into_iter().map(str::to_string).collect();
    let present: BTreeSet<Equipment> = detected.iter().filter_map(|l| map.resolve(l)).collect();
    let missing: BTreeSet<Equipment> = ComplianceResult::required()
        .difference(&present)
        .copied()
        .collect();
    let passed = missing.is_empty();

    ComplianceResult {
        detected,
        present,
        missing,
        passed,
    }
}

/// 对检测结果做合规判定
///
/// `min_confidence` 为 `None` 时, 任何检测到的标签都计入 (与模型自身阈值一致);
/// 为 `Some(t)` 时置信度低于 t 的检测不计入 present, 但仍保留在 detected 中。
pub fn check_detections(
    dets: &[Detection],
    map: &LabelMap,
    min_confidence: Option<f32>,
) -> ComplianceResult {
    let counted = dets
        .iter()
        .filter(|d| min_confidence.map_or(true, |t| d.confidence >= t))
        .map(|d| d.label.as_str());
    let mut result = check(counted, map);
    result
        .detected
        .extend(dets.iter().map(|d| d.label.clone()));
    result
}
