use super::*;

/// Header name to column position for one source file.
pub(super) struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub(super) fn new(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), index))
            .collect();
        Self { positions }
    }

    pub(super) fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    fn field<'r>(&self, row: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.positions.get(name).and_then(|index| row.get(*index))
    }
}

/// Normalizes one source row into a store record, or names the essential
/// field that came out empty.
pub(super) fn record_from_row(
    descriptor: &EntityDescriptor,
    header: &HeaderIndex,
    row: &StringRecord,
    imported_at: NaiveDate,
) -> std::result::Result<EntityRecord, String> {
    let mut values = Vec::with_capacity(descriptor.extras.len() + 2);

    for mapping in std::iter::once(&descriptor.id)
        .chain(std::iter::once(&descriptor.text))
        .chain(descriptor.extras.iter())
    {
        let value = mapping.normalize(header.field(row, mapping.source_field));
        if mapping.required && value.is_empty() {
            return Err(format!("missing {}", mapping.source_field));
        }
        values.push(value);
    }

    let mut values = values.into_iter();
    let id = values.next().unwrap_or_default();
    let display_text = values.next().unwrap_or_default();

    Ok(EntityRecord {
        id,
        display_text,
        extras: values.collect(),
        imported_at,
    })
}
