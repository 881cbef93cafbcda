use serde::{Deserialize, Serialize};

/// Expense classification. Anything outside the catalog is `Otros`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Comida,
    Transporte,
    Ocio,
    Salud,
    Educacion,
    Servicios,
    Compras,
    #[default]
    Otros,
}

impl Category {
    /// Catalog order. Aggregations report categories in this order.
    pub const ALL: [Category; 8] = [
        Category::Comida,
        Category::Transporte,
        Category::Ocio,
        Category::Salud,
        Category::Educacion,
        Category::Servicios,
        Category::Compras,
        Category::Otros,
    ];

    pub fn value(self) -> &'static str {
        match self {
            Category::Comida => "comida",
            Category::Transporte => "transporte",
            Category::Ocio => "ocio",
            Category::Salud => "salud",
            Category::Educacion => "educacion",
            Category::Servicios => "servicios",
            Category::Compras => "compras",
            Category::Otros => "otros",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Comida => "Comida",
            Category::Transporte => "Transporte",
            Category::Ocio => "Ocio",
            Category::Salud => "Salud",
            Category::Educacion => "Educación",
            Category::Servicios => "Servicios",
            Category::Compras => "Compras",
            Category::Otros => "Otros",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Category::Comida => "#ef4444",
            Category::Transporte => "#f59e0b",
            Category::Ocio => "#8b5cf6",
            Category::Salud => "#10b981",
            Category::Educacion => "#3b82f6",
            Category::Servicios => "#06b6d4",
            Category::Compras => "#ec4899",
            Category::Otros => "#6b7280",
        }
    }

    /// Looks up a stored value, falling back to `Otros` for unknown or empty input.
    pub fn from_value(value: &str) -> Self {
        Category::ALL
            .into_iter()
            .find(|c| c.value() == value.trim())
            .unwrap_or_default()
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_value(category.value()), category);
        }
    }

    #[test]
    fn unknown_values_fold_into_otros() {
        assert_eq!(Category::from_value("viajes"), Category::Otros);
        assert_eq!(Category::from_value(""), Category::Otros);
        assert_eq!(Category::from("COMIDA".to_owned()), Category::Otros);
    }

    #[test]
    fn catalog_metadata() {
        assert_eq!(Category::Educacion.label(), "Educación");
        assert_eq!(Category::Comida.color(), "#ef4444");
        assert_eq!(Category::ALL.last(), Some(&Category::Otros));
    }
}
