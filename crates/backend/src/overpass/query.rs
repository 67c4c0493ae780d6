//! Overpass QL text for the two ingestion steps.

use enodia_shared::models::InfrastructureCategory;

/// Overpass numbers the area derived from relation `r` as `r + AREA_ID_OFFSET`.
pub const AREA_ID_OFFSET: u64 = 3_600_000_000;

/// Handle of a resolved administrative area, always in area-id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaHandle(u64);

impl AreaHandle {
    pub fn from_raw(raw_id: u64) -> Self {
        AreaHandle(to_area_id(raw_id))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Map a relation id into area-id space; ids already there are left alone.
pub fn to_area_id(raw_id: u64) -> u64 {
    if raw_id >= AREA_ID_OFFSET {
        raw_id
    } else {
        raw_id + AREA_ID_OFFSET
    }
}

/// Escape a value for use inside a double-quoted Overpass string.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

pub fn area_query(name: &str, admin_level: u8, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{timeout_secs}];\narea[\"name\"=\"{}\"][\"boundary\"=\"administrative\"][\"admin_level\"=\"{admin_level}\"];\nout ids;\n",
        escape(name)
    )
}

/// Tag filters selecting the ways of one category. `Other` has none: it only
/// collects whatever the other filters return without matching a rule.
pub fn category_filters(category: InfrastructureCategory) -> &'static [&'static str] {
    match category {
        InfrastructureCategory::Electricity => &[r#"["power"="line"]"#],
        InfrastructureCategory::Water => &[
            r#"["man_made"="pipeline"]["pipeline"="water"]"#,
            r#"["utility"="water"]"#,
        ],
        InfrastructureCategory::Road => &[r#"["highway"]"#],
        InfrastructureCategory::Rail => &[r#"["railway"]"#],
        InfrastructureCategory::Other => &[],
    }
}

pub fn infrastructure_query(
    area: AreaHandle,
    categories: &[InfrastructureCategory],
    timeout_secs: u64,
) -> String {
    let mut q = format!(
        "[out:json][timeout:{timeout_secs}];\narea({})->.searchArea;\n(\n",
        area.id()
    );
    for filter in categories.iter().flat_map(|c| category_filters(*c)) {
        q.push_str(&format!("  way{filter}(area.searchArea);\n"));
    }
    q.push_str(");\nout geom;\n");
    q
}
