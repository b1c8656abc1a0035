use super::domain::{ClearanceCategory, ClearanceItem, ItemId};

pub const FINANCE_ITEM_ID: &str = "7";

#[derive(Debug, Clone)]
pub struct ClearanceCatalog {
    items: Vec<ClearanceItem>,
}

impl ClearanceCatalog {
    pub fn standard() -> Self {
        Self {
            items: standard_items(),
        }
    }

    pub fn from_items(items: Vec<ClearanceItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ClearanceItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&ClearanceItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn required_items(&self) -> impl Iterator<Item = &ClearanceItem> {
        self.items.iter().filter(|item| item.is_required)
    }

    /// Required items that are physically handed in at a station.
    pub fn submission_items(&self) -> impl Iterator<Item = &ClearanceItem> {
        self.required_items().filter(|item| item.requires_submission)
    }

    pub fn items_in(&self, category: ClearanceCategory) -> Vec<&ClearanceItem> {
        self.items
            .iter()
            .filter(|item| item.category == category)
            .collect()
    }

    pub fn finance_item(&self) -> Option<&ClearanceItem> {
        self.items
            .iter()
            .find(|item| item.category == ClearanceCategory::Finance)
    }
}

fn item(
    id: &str,
    name: &str,
    category: ClearanceCategory,
    description: &str,
    requires_submission: bool,
) -> ClearanceItem {
    ClearanceItem {
        id: ItemId::new(id),
        name: name.to_string(),
        category,
        description: description.to_string(),
        is_required: true,
        requires_submission,
    }
}

fn standard_items() -> Vec<ClearanceItem> {
    vec![
        item(
            "1",
            "Calculator",
            ClearanceCategory::SubjectMaterials,
            "Scientific calculator issued for mathematics",
            true,
        ),
        item(
            "2",
            "Mathematics Textbook",
            ClearanceCategory::SubjectMaterials,
            "Mathematics course textbook",
            true,
        ),
        item(
            "3",
            "Computer Science Textbook",
            ClearanceCategory::SubjectMaterials,
            "Computer Science course textbook",
            true,
        ),
        item(
            "4",
            "Physics Textbook",
            ClearanceCategory::SubjectMaterials,
            "Physics course textbook",
            true,
        ),
        item(
            "5",
            "Uniform",
            ClearanceCategory::OtherRequirements,
            "School uniform items",
            true,
        ),
        item(
            "6",
            "Sports Equipment",
            ClearanceCategory::OtherRequirements,
            "Any borrowed sports equipment",
            true,
        ),
        item(
            FINANCE_ITEM_ID,
            "Finance Clearance",
            ClearanceCategory::Finance,
            "Outstanding tuition and fees",
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_has_seven_required_items() {
        let catalog = ClearanceCatalog::standard();
        assert_eq!(catalog.required_items().count(), 7);
        assert_eq!(catalog.submission_items().count(), 6);
        assert_eq!(
            catalog.items_in(ClearanceCategory::SubjectMaterials).len(),
            4
        );
        let finance = catalog.finance_item().expect("finance item");
        assert_eq!(finance.id, ItemId::new(FINANCE_ITEM_ID));
        assert!(!finance.requires_submission);
    }
}
