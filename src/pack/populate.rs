use std::collections::HashSet;

use serde::Serialize;

use super::{Pack, PopulateOptions, StoredRecord, TargetMut};
use crate::{
    error::{PackError, Result},
    filter::NameFilter,
    io::{Record, RecordKind},
    model::{Entity, LookupParameter, Parameter, ParameterCollection, Tensor},
};

/// What a populate changed, by local entity name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulateReport {
    pub key: String,
    pub updated: Vec<String>,
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

impl Pack {
    /// Fills `target` from the block saved under the resolved key.
    ///
    /// Every record is decoded and checked against the target before anything is written, so a
    /// failed populate leaves the target untouched.
    pub fn populate<'a>(
        &self,
        target: impl Into<TargetMut<'a>>,
        opts: &PopulateOptions,
    ) -> Result<PopulateReport> {
        let target = target.into();
        let key = opts
            .key
            .clone()
            .unwrap_or_else(|| target.default_key().to_string());
        let index = self.load_index()?;
        let entry = index
            .lookup(&key)
            .cloned()
            .ok_or_else(|| PackError::KeyNotFound { key: key.clone() })?;
        let records = self.read_block(&entry)?;

        let mut report = PopulateReport {
            key,
            ..PopulateReport::default()
        };
        match target {
            TargetMut::Collection(model) => {
                populate_collection(model, records, opts.filter.as_ref(), &mut report)?;
            }
            TargetMut::Parameter(param) => {
                let record = select_record(&report.key, param.name(), records)?;
                fill_parameter(param, record)?;
                report.updated.push(param.name().to_string());
            }
            TargetMut::Lookup(table) => {
                let record = select_record(&report.key, table.name(), records)?;
                fill_lookup(table, record)?;
                report.updated.push(table.name().to_string());
            }
        }
        tracing::debug!(
            key = %report.key,
            updated = report.updated.len(),
            created = report.created.len(),
            skipped = report.skipped.len(),
            "populated"
        );
        Ok(report)
    }
}

enum Step {
    Update(Record),
    Create(Entity),
}

fn populate_collection(
    model: &mut ParameterCollection,
    records: Vec<StoredRecord>,
    filter: &dyn NameFilter,
    report: &mut PopulateReport,
) -> Result<()> {
    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(records.len());
    for stored in records {
        let record = stored.record;
        if !seen.insert(record.name.clone()) {
            return Err(PackError::corrupt(
                stored.offset,
                format!("block stores '{}' more than once", record.name),
            ));
        }
        if !filter.admits(&model.full_name(&record.name)) {
            report.skipped.push(record.name);
            continue;
        }
        match model.get(&record.name) {
            Some(existing) => {
                check_compatible(existing, &record)?;
                plan.push(Step::Update(record));
            }
            None => plan.push(Step::Create(into_entity(record, stored.offset)?)),
        }
    }

    for step in plan {
        match step {
            Step::Update(record) => {
                let name = record.name.clone();
                match model.get_mut(&name) {
                    Some(Entity::Parameter(param)) => fill_parameter(param, record)?,
                    Some(Entity::Lookup(table)) => fill_lookup(table, record)?,
                    None => {
                        return Err(PackError::RecordNotFound {
                            key: report.key.clone(),
                            name,
                        });
                    }
                }
                report.updated.push(name);
            }
            Step::Create(entity) => {
                report.created.push(entity.name().to_string());
                model.insert(entity)?;
            }
        }
    }
    Ok(())
}

/// A single-entity populate uses the only record of the block, or the one carrying its name.
fn select_record(key: &str, name: &str, mut records: Vec<StoredRecord>) -> Result<Record> {
    if records.len() == 1 {
        return Ok(records.remove(0).record);
    }
    records
        .into_iter()
        .map(|stored| stored.record)
        .find(|record| record.name == name)
        .ok_or_else(|| PackError::RecordNotFound {
            key: key.to_string(),
            name: name.to_string(),
        })
}

fn check_compatible(existing: &Entity, record: &Record) -> Result<()> {
    let (kind, tensors) = match existing {
        Entity::Parameter(param) => (RecordKind::Parameter, std::slice::from_ref(param.tensor())),
        Entity::Lookup(table) => (RecordKind::LookupParameter, table.rows()),
    };
    ensure_same_layout(existing.name(), kind, tensors, record)
}

fn ensure_same_layout(
    name: &str,
    kind: RecordKind,
    tensors: &[Tensor],
    record: &Record,
) -> Result<()> {
    let same = kind == record.kind
        && tensors.len() == record.tensors.len()
        && tensors
            .iter()
            .zip(&record.tensors)
            .all(|(have, stored)| have.shape() == stored.shape());
    if same {
        return Ok(());
    }
    Err(PackError::ShapeMismatch {
        name: name.to_string(),
        expected: describe(kind, tensors),
        actual: describe(record.kind, &record.tensors),
    })
}

fn fill_parameter(param: &mut Parameter, record: Record) -> Result<()> {
    ensure_same_layout(
        param.name(),
        RecordKind::Parameter,
        std::slice::from_ref(param.tensor()),
        &record,
    )?;
    for tensor in record.tensors {
        let (_, values) = tensor.into_parts();
        param.tensor_mut().set_values(values)?;
    }
    Ok(())
}

fn fill_lookup(table: &mut LookupParameter, record: Record) -> Result<()> {
    ensure_same_layout(table.name(), RecordKind::LookupParameter, table.rows(), &record)?;
    for (row, tensor) in table.rows_mut().iter_mut().zip(record.tensors) {
        let (_, values) = tensor.into_parts();
        row.set_values(values)?;
    }
    Ok(())
}

fn into_entity(record: Record, offset: u64) -> Result<Entity> {
    let name = record.name.clone();
    let entity = match record.kind {
        RecordKind::Parameter => record.into_parameter().map(Entity::Parameter),
        RecordKind::LookupParameter => record.into_lookup().map(Entity::Lookup),
    };
    entity.ok_or_else(|| PackError::corrupt(offset, format!("record '{name}' has no tensor")))
}

fn describe(kind: RecordKind, tensors: &[Tensor]) -> String {
    match kind {
        RecordKind::Parameter => match tensors {
            [tensor] => format!("parameter {}", tensor.shape()),
            _ => format!("parameter with {} tensors", tensors.len()),
        },
        RecordKind::LookupParameter => match tensors.first() {
            Some(first) if tensors.iter().all(|row| row.shape() == first.shape()) => {
                format!("lookup_parameter {} x {}", tensors.len(), first.shape())
            }
            Some(_) => {
                let shapes: Vec<String> = tensors.iter().map(|row| row.shape().to_string()).collect();
                format!("lookup_parameter [{}]", shapes.join(", "))
            }
            None => "lookup_parameter 0 x []".to_string(),
        },
    }
}
