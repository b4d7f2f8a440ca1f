//! The nutrient catalog: 34 tracked nutrients with canonical names, units,
//! EFSA-based default daily requirements, safety bounds, and adjustment sizes.
//!
//! ## Why one declarative table?
//!
//! Default formulas, safety limits, and adjustment percentages all key on the
//! same stable nutrient id. Spreading them over three separate lookup
//! functions invites drift — an id gains a bound but loses its default, or a
//! renamed nutrient stops resolving. A single `NutrientDef` row per nutrient
//! keeps every fact about a nutrient in one place and makes the whole catalog
//! testable without touching any other component.
//!
//! The catalog is immutable reference data: construct it once (it is cheap),
//! share it by `Arc` or reference. There is no global state.

use std::collections::HashMap;

/// Stable nutrient identifier, 1..=34.
pub type NutrientId = u32;

/// Number of nutrients in the catalog.
pub const NUTRIENT_COUNT: usize = 34;

/// Biological sex, as used by the EFSA default formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Sex {
    Male,
    Female,
}

/// How a nutrient's default daily requirement is derived from sex and age.
///
/// Only three EFSA rules need more than a constant; encoding them as data
/// keeps [`NutrientCatalog::recommended_quantity`] a table walk instead of a
/// 34-arm conditional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formula {
    /// Same default for everyone.
    Fixed(f32),
    /// Differs by sex (protein, vitamin C).
    BySex { male: f32, female: f32 },
    /// Differs below/at an age threshold (fiber, calcium at 18).
    ByAge { under: u32, minor: f32, adult: f32 },
    /// Iron: elevated for females aged 19–50, baseline otherwise.
    FemaleIron { baseline: f32, elevated: f32 },
}

impl Formula {
    /// Evaluate the formula for the given sex and age in years.
    pub fn evaluate(&self, sex: Sex, age: u32) -> f32 {
        match *self {
            Formula::Fixed(v) => v,
            Formula::BySex { male, female } => {
                if sex == Sex::Male {
                    male
                } else {
                    female
                }
            }
            Formula::ByAge {
                under,
                minor,
                adult,
            } => {
                if age < under {
                    minor
                } else {
                    adult
                }
            }
            Formula::FemaleIron { baseline, elevated } => {
                if sex == Sex::Female && (19..=50).contains(&age) {
                    elevated
                } else {
                    baseline
                }
            }
        }
    }
}

/// One catalog row: everything the system knows about a nutrient.
#[derive(Debug, Clone)]
pub struct NutrientDef {
    pub id: NutrientId,
    pub name: &'static str,
    pub unit: &'static str,
    /// EFSA-based default daily requirement.
    pub default: Formula,
    /// Hard floor/ceiling for the daily target. `None` falls back to
    /// [`DEFAULT_SAFETY_BOUNDS`].
    pub bounds: Option<(f32, f32)>,
    /// Fractional nudge applied per dosage-change directive. `None` falls
    /// back to [`DEFAULT_ADJUSTMENT`].
    pub adjustment: Option<f32>,
}

/// Safety bounds for nutrients without an explicit entry.
pub const DEFAULT_SAFETY_BOUNDS: (f32, f32) = (0.1, 1000.0);

/// Adjustment percentage for nutrients without an explicit entry.
pub const DEFAULT_ADJUSTMENT: f32 = 0.15;

use Formula::{ByAge, BySex, FemaleIron, Fixed};

/// The full reference table. Ids are stable and dense (1..=34); persisted
/// requirement rows and recommendation directives both key on them.
const NUTRIENTS: [NutrientDef; NUTRIENT_COUNT] = [
    // Macronutrients
    NutrientDef { id: 1,  name: "Energy",              unit: "kcal", default: Fixed(2500.0),                                bounds: Some((1200.0, 4000.0)), adjustment: Some(0.10) },
    NutrientDef { id: 2,  name: "Protein",             unit: "g",    default: BySex { male: 56.0, female: 46.0 },           bounds: Some((10.0, 200.0)),    adjustment: Some(0.15) },
    NutrientDef { id: 3,  name: "Carbohydrates",       unit: "g",    default: Fixed(130.0),                                 bounds: Some((50.0, 500.0)),    adjustment: Some(0.10) },
    NutrientDef { id: 4,  name: "Fiber",               unit: "g",    default: ByAge { under: 18, minor: 25.0, adult: 30.0 }, bounds: Some((10.0, 50.0)),    adjustment: None },
    NutrientDef { id: 5,  name: "Total Fat",           unit: "g",    default: Fixed(70.0),                                  bounds: Some((20.0, 150.0)),    adjustment: Some(0.10) },
    NutrientDef { id: 6,  name: "Saturated Fat",       unit: "g",    default: Fixed(20.0),                                  bounds: None,                   adjustment: None },
    NutrientDef { id: 7,  name: "Monounsaturated Fat", unit: "g",    default: Fixed(20.0),                                  bounds: None,                   adjustment: None },
    NutrientDef { id: 8,  name: "Polyunsaturated Fat", unit: "g",    default: Fixed(17.0),                                  bounds: None,                   adjustment: None },
    NutrientDef { id: 9,  name: "Cholesterol",         unit: "mg",   default: Fixed(300.0),                                 bounds: None,                   adjustment: None },
    NutrientDef { id: 10, name: "Sugars",              unit: "g",    default: Fixed(50.0),                                  bounds: None,                   adjustment: None },
    NutrientDef { id: 11, name: "Added Sugars",        unit: "g",    default: Fixed(25.0),                                  bounds: None,                   adjustment: None },
    NutrientDef { id: 12, name: "Water",               unit: "mL",   default: Fixed(2000.0),                                bounds: Some((1000.0, 6000.0)), adjustment: None },
    // Fat-soluble vitamins
    NutrientDef { id: 13, name: "Vitamin A",           unit: "µg",   default: Fixed(900.0),                                 bounds: Some((300.0, 3000.0)),  adjustment: Some(0.15) },
    NutrientDef { id: 14, name: "Vitamin C",           unit: "mg",   default: BySex { male: 90.0, female: 75.0 },           bounds: Some((30.0, 2000.0)),   adjustment: Some(0.20) },
    NutrientDef { id: 15, name: "Vitamin D",           unit: "µg",   default: Fixed(15.0),                                  bounds: Some((5.0, 100.0)),     adjustment: Some(0.20) },
    NutrientDef { id: 16, name: "Vitamin E",           unit: "mg",   default: Fixed(15.0),                                  bounds: Some((6.0, 1000.0)),    adjustment: Some(0.15) },
    NutrientDef { id: 17, name: "Vitamin K",           unit: "µg",   default: Fixed(120.0),                                 bounds: Some((30.0, 1000.0)),   adjustment: Some(0.15) },
    // Water-soluble vitamins
    NutrientDef { id: 18, name: "Thiamin (B1)",        unit: "mg",   default: Fixed(1.2),                                   bounds: Some((0.5, 50.0)),      adjustment: Some(0.15) },
    NutrientDef { id: 19, name: "Riboflavin (B2)",     unit: "mg",   default: Fixed(1.3),                                   bounds: Some((0.6, 50.0)),      adjustment: Some(0.15) },
    NutrientDef { id: 20, name: "Niacin (B3)",         unit: "mg",   default: Fixed(16.0),                                  bounds: Some((6.0, 35.0)),      adjustment: Some(0.15) },
    NutrientDef { id: 21, name: "Vitamin B6",          unit: "mg",   default: Fixed(1.3),                                   bounds: Some((0.5, 100.0)),     adjustment: Some(0.15) },
    NutrientDef { id: 22, name: "Folate (B9)",         unit: "µg",   default: Fixed(400.0),                                 bounds: Some((150.0, 1000.0)),  adjustment: Some(0.25) },
    NutrientDef { id: 23, name: "Vitamin B12",         unit: "µg",   default: Fixed(2.4),                                   bounds: Some((1.0, 3000.0)),    adjustment: Some(0.25) },
    // Minerals
    NutrientDef { id: 24, name: "Calcium",             unit: "mg",   default: ByAge { under: 18, minor: 1300.0, adult: 1000.0 }, bounds: Some((400.0, 2500.0)), adjustment: Some(0.15) },
    NutrientDef { id: 25, name: "Iron",                unit: "mg",   default: FemaleIron { baseline: 8.0, elevated: 18.0 }, bounds: Some((5.0, 45.0)),      adjustment: Some(0.20) },
    NutrientDef { id: 26, name: "Magnesium",           unit: "mg",   default: Fixed(400.0),                                 bounds: Some((150.0, 400.0)),   adjustment: Some(0.15) },
    NutrientDef { id: 27, name: "Phosphorus",          unit: "mg",   default: Fixed(700.0),                                 bounds: Some((400.0, 4000.0)),  adjustment: None },
    NutrientDef { id: 28, name: "Potassium",           unit: "mg",   default: Fixed(4700.0),                                bounds: Some((1600.0, 4700.0)), adjustment: None },
    NutrientDef { id: 29, name: "Sodium",              unit: "mg",   default: Fixed(1500.0),                                bounds: Some((500.0, 2300.0)),  adjustment: None },
    NutrientDef { id: 30, name: "Zinc",                unit: "mg",   default: Fixed(11.0),                                  bounds: Some((3.0, 40.0)),      adjustment: Some(0.20) },
    NutrientDef { id: 31, name: "Copper",              unit: "mg",   default: Fixed(0.9),                                   bounds: Some((0.4, 10.0)),      adjustment: None },
    NutrientDef { id: 32, name: "Manganese",           unit: "mg",   default: Fixed(2.3),                                   bounds: Some((1.0, 11.0)),      adjustment: None },
    NutrientDef { id: 33, name: "Selenium",            unit: "µg",   default: Fixed(55.0),                                  bounds: Some((20.0, 400.0)),    adjustment: None },
    NutrientDef { id: 34, name: "Iodine",              unit: "µg",   default: Fixed(150.0),                                 bounds: Some((70.0, 1100.0)),   adjustment: None },
];

/// Immutable lookup over the 34 tracked nutrients.
///
/// Construct once with [`NutrientCatalog::new`] and share by reference or
/// `Arc`. All lookups are O(1); unknown ids degrade to neutral values rather
/// than panicking because directive ids originate from external model output.
#[derive(Debug)]
pub struct NutrientCatalog {
    by_name: HashMap<String, NutrientId>,
}

impl NutrientCatalog {
    pub fn new() -> Self {
        let by_name = NUTRIENTS
            .iter()
            .map(|n| (n.name.to_lowercase(), n.id))
            .collect();
        Self { by_name }
    }

    fn def(&self, id: NutrientId) -> Option<&'static NutrientDef> {
        // Ids are dense 1..=34, so the table index is id - 1.
        if (1..=NUTRIENT_COUNT as u32).contains(&id) {
            Some(&NUTRIENTS[(id - 1) as usize])
        } else {
            None
        }
    }

    /// EFSA-based default daily requirement for a nutrient. Unknown ids
    /// return 0.0.
    pub fn recommended_quantity(&self, id: NutrientId, sex: Sex, age: u32) -> f32 {
        self.def(id)
            .map(|n| n.default.evaluate(sex, age))
            .unwrap_or(0.0)
    }

    /// Hard (min, max) daily safety bounds for a nutrient.
    pub fn safety_bounds(&self, id: NutrientId) -> (f32, f32) {
        self.def(id)
            .and_then(|n| n.bounds)
            .unwrap_or(DEFAULT_SAFETY_BOUNDS)
    }

    /// Fractional adjustment size used by bounded bulk updates.
    pub fn adjustment_percentage(&self, id: NutrientId) -> f32 {
        self.def(id)
            .and_then(|n| n.adjustment)
            .unwrap_or(DEFAULT_ADJUSTMENT)
    }

    /// Resolve a canonical nutrient name to its id.
    ///
    /// Matching is case-insensitive and whitespace-trimmed but otherwise
    /// exact: "iron" resolves, "Fe" and "Iron supplement" do not.
    pub fn resolve_id_by_name(&self, name: &str) -> Option<NutrientId> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    /// Canonical display name for an id.
    pub fn name(&self, id: NutrientId) -> Option<&'static str> {
        self.def(id).map(|n| n.name)
    }

    /// Measurement unit for an id.
    pub fn unit(&self, id: NutrientId) -> Option<&'static str> {
        self.def(id).map(|n| n.unit)
    }

    /// All canonical names in id order. Used to build the constrained
    /// recommendation prompt so the allowed list can never drift from the
    /// catalog.
    pub fn names(&self) -> Vec<&'static str> {
        NUTRIENTS.iter().map(|n| n.name).collect()
    }

    /// All ids in order.
    pub fn ids(&self) -> impl Iterator<Item = NutrientId> {
        1..=NUTRIENT_COUNT as u32
    }
}

impl Default for NutrientCatalog {
    fn default() -> Self {
        Self::new()
    }
}
