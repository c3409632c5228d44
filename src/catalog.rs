use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::errors::{DentalSegError, Result};

pub type ClassId = u8;

/// ID reserved for the background class in every catalog.
pub const BACKGROUND: ClassId = 0;

/// How a class participates in the diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassRole {
    Background,
    /// Healthy anatomy. When it dominates, the result is still healthy.
    Normal,
    Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationClass {
    pub id: ClassId,
    pub name: String,
    pub color: [u8; 3],
    pub legend: String,
    pub role: ClassRole,
}

impl SegmentationClass {
    pub fn rgb(&self) -> Rgb<u8> {
        Rgb(self.color)
    }
}

/// Ordered, validated mapping from class ID to name, display color and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassCatalog {
    classes: Vec<SegmentationClass>,
}

#[derive(Deserialize)]
struct CatalogFile {
    classes: Vec<SegmentationClass>,
}

impl ClassCatalog {
    pub fn new(classes: Vec<SegmentationClass>) -> Result<Self> {
        validate(&classes)?;
        Ok(Self { classes })
    }

    /// The five-class catalog the dental U-Net was trained with.
    pub fn dental() -> Self {
        let class = |id, name: &str, color, legend: &str, role| SegmentationClass {
            id,
            name: name.to_string(),
            color,
            legend: legend.to_string(),
            role,
        };
        Self {
            classes: vec![
                class(0, "background", [0, 0, 0], "Black - Background", ClassRole::Background),
                class(1, "tooth", [0, 255, 0], "Green - Normal tooth structure", ClassRole::Normal),
                class(2, "caries", [255, 255, 0], "Yellow - Dental caries detected", ClassRole::Condition),
                class(3, "cavity", [255, 0, 0], "Red - Cavity formation", ClassRole::Condition),
                class(4, "crack", [255, 165, 0], "Orange - Tooth crack/fracture", ClassRole::Condition),
            ],
        }
    }

    /// Background plus tooth, for single-channel (sigmoid) models.
    pub fn binary() -> Self {
        let mut classes = Self::dental().classes;
        classes.truncate(2);
        Self { classes }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.classes)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| DentalSegError::FileSystem {
            path: path.to_path_buf(),
            operation: "read class catalog".to_string(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, id: ClassId) -> Option<&SegmentationClass> {
        self.classes.get(usize::from(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentationClass> {
        self.classes.iter()
    }

    /// Classes in ID order, background excluded.
    pub fn foreground(&self) -> impl Iterator<Item = &SegmentationClass> {
        self.classes.iter().filter(|c| c.role != ClassRole::Background)
    }

    pub fn normal_class(&self) -> Option<&SegmentationClass> {
        self.classes.iter().find(|c| c.role == ClassRole::Normal)
    }

    /// Legend text for every non-background class, keyed by class name.
    pub fn legend(&self) -> BTreeMap<String, String> {
        self.foreground()
            .map(|c| (c.name.clone(), c.legend.clone()))
            .collect()
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::dental()
    }
}

fn validate(classes: &[SegmentationClass]) -> Result<()> {
    let invalid = |reason: String| Err(DentalSegError::validation("class catalog", reason));

    if classes.is_empty() {
        return invalid("must contain at least the background class".to_string());
    }
    if classes.len() > usize::from(ClassId::MAX) + 1 {
        return invalid(format!("has {} classes, at most 256 are supported", classes.len()));
    }

    let mut names = HashSet::new();
    let mut normal_count = 0;
    for (index, class) in classes.iter().enumerate() {
        if usize::from(class.id) != index {
            return invalid(format!(
                "class `{}` has id {} but is listed at position {index}",
                class.name, class.id
            ));
        }
        if class.name.trim().is_empty() {
            return invalid(format!("class {} has an empty name", class.id));
        }
        if !names.insert(class.name.as_str()) {
            return invalid(format!("class name `{}` is used twice", class.name));
        }
        match (class.id == BACKGROUND, class.role) {
            (true, ClassRole::Background) => {}
            (true, _) => return invalid("class 0 must have the background role".to_string()),
            (false, ClassRole::Background) => {
                return invalid(format!("only class 0 may be background, not `{}`", class.name))
            }
            (false, ClassRole::Normal) => normal_count += 1,
            (false, ClassRole::Condition) => {}
        }
    }
    if normal_count > 1 {
        return invalid("at most one class may have the normal role".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dental_catalog_is_valid() {
        let catalog = ClassCatalog::dental();
        assert!(ClassCatalog::new(catalog.classes.clone()).is_ok());
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.normal_class().map(|c| c.name.as_str()), Some("tooth"));
        assert_eq!(catalog.get(3).map(|c| c.color), Some([255, 0, 0]));
    }

    #[test]
    fn test_legend_excludes_background() {
        let legend = ClassCatalog::dental().legend();
        assert_eq!(legend.len(), 4);
        assert!(!legend.contains_key("background"));
        assert_eq!(legend["cavity"], "Red - Cavity formation");
    }

    #[test]
    fn test_binary_catalog() {
        let catalog = ClassCatalog::binary();
        let names: Vec<_> = catalog.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["background", "tooth"]);
    }

    #[test]
    fn test_rejects_out_of_order_ids() {
        let mut classes = ClassCatalog::dental().classes;
        classes.swap(2, 3);
        assert!(matches!(
            ClassCatalog::new(classes),
            Err(DentalSegError::Validation { .. })
        ));
    }

    #[test]
    fn test_rejects_background_role_misuse() {
        let mut classes = ClassCatalog::dental().classes;
        classes[0].role = ClassRole::Condition;
        assert!(ClassCatalog::new(classes).is_err());

        let mut classes = ClassCatalog::dental().classes;
        classes[4].role = ClassRole::Background;
        assert!(ClassCatalog::new(classes).is_err());
    }

    #[test]
    fn test_rejects_duplicate_names_and_second_normal() {
        let mut classes = ClassCatalog::dental().classes;
        classes[2].name = "cavity".to_string();
        assert!(ClassCatalog::new(classes).is_err());

        let mut classes = ClassCatalog::dental().classes;
        classes[2].role = ClassRole::Normal;
        assert!(ClassCatalog::new(classes).is_err());
    }

    #[test]
    fn test_from_json_str() -> Result<()> {
        let json = r#"{ "classes": [
            { "id": 0, "name": "background", "color": [0, 0, 0], "legend": "Black", "role": "background" },
            { "id": 1, "name": "plaque", "color": [0, 0, 255], "legend": "Blue - Plaque", "role": "condition" }
        ] }"#;
        let catalog = ClassCatalog::from_json_str(json)?;
        assert_eq!(catalog.len(), 2);
        assert!(catalog.normal_class().is_none());
        assert_eq!(catalog.get(1).map(|c| c.rgb()), Some(Rgb([0, 0, 255])));
        Ok(())
    }

    #[test]
    fn test_from_json_str_rejects_malformed() {
        assert!(matches!(
            ClassCatalog::from_json_str("{ \"classes\": 3 }"),
            Err(DentalSegError::Configuration { .. })
        ));
        assert!(ClassCatalog::from_json_str("{ \"classes\": [] }").is_err());
    }
}
