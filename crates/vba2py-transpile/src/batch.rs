//! Converting many modules at once.
//!
//! Modules share nothing but the read-only tables, so a batch runs on a rayon pool when the
//! `parallel` feature is on. Results are collected by input position, never completion order.

use std::time::{Duration, Instant};

use vba2py_extract::Extraction;
use vba2py_model::{ConversionResult, NoteCode, RawModule, TranslationNote};

use crate::tables::MappingTables;
use crate::{classify_and_convert, ConvertOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Modules not started before this much time has passed are reported as timed out.
    pub timeout: Option<Duration>,
    /// Worker threads; `None` uses the default pool size.
    pub threads: Option<usize>,
}

fn convert_one(
    module: &RawModule,
    tables: &MappingTables,
    options: &ConvertOptions,
    deadline: Option<Instant>,
) -> ConversionResult {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        log::warn!("batch deadline passed before `{}` was started", module.name);
        return ConversionResult::failed(
            &module.name,
            None,
            TranslationNote::warning(NoteCode::BatchTimeout, "batch timed out before this module was converted"),
        );
    }
    classify_and_convert(module, tables, options)
}

#[cfg(feature = "parallel")]
fn run(
    modules: &[RawModule],
    tables: &MappingTables,
    options: &ConvertOptions,
    batch: &BatchOptions,
    deadline: Option<Instant>,
) -> Vec<ConversionResult> {
    use rayon::prelude::*;

    let convert_all = || {
        modules
            .par_iter()
            .map(|m| convert_one(m, tables, options, deadline))
            .collect::<Vec<_>>()
    };
    let Some(threads) = batch.threads else {
        return convert_all();
    };
    match rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build() {
        Ok(pool) => pool.install(convert_all),
        Err(err) => {
            log::warn!("cannot build a {threads}-thread pool ({err}); converting sequentially");
            sequential(modules, tables, options, deadline)
        }
    }
}

#[cfg(not(feature = "parallel"))]
fn run(
    modules: &[RawModule],
    tables: &MappingTables,
    options: &ConvertOptions,
    _batch: &BatchOptions,
    deadline: Option<Instant>,
) -> Vec<ConversionResult> {
    sequential(modules, tables, options, deadline)
}

fn sequential(
    modules: &[RawModule],
    tables: &MappingTables,
    options: &ConvertOptions,
    deadline: Option<Instant>,
) -> Vec<ConversionResult> {
    modules
        .iter()
        .map(|m| convert_one(m, tables, options, deadline))
        .collect()
}

/// One result per module, in input order. Each module is classified first.
pub fn convert_batch(
    modules: &[RawModule],
    tables: &MappingTables,
    options: &ConvertOptions,
    batch: &BatchOptions,
) -> Vec<ConversionResult> {
    let deadline = batch.timeout.map(|t| Instant::now() + t);
    let results = run(modules, tables, options, batch, deadline);
    log::debug!(
        "converted {} modules, {} failed",
        results.len(),
        results.iter().filter(|r| !r.success).count()
    );
    results
}

/// Converts every module of an extraction, then reports each module that could not be
/// recovered as a failed result carrying its extraction note.
pub fn convert_extraction(
    extraction: &Extraction,
    tables: &MappingTables,
    options: &ConvertOptions,
    batch: &BatchOptions,
) -> Vec<ConversionResult> {
    let mut results = convert_batch(&extraction.modules, tables, options, batch);
    results.extend(
        extraction
            .failures
            .iter()
            .map(|f| ConversionResult::failed(&f.name, None, f.note())),
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use vba2py_model::ModuleOrigin;

    fn module(name: &str, source: &str) -> RawModule {
        RawModule::new(name, source, ModuleOrigin::CompoundProject).with_type_hint("standard")
    }

    #[test]
    fn keeps_input_order() {
        let modules: Vec<RawModule> = (0..12)
            .map(|i| module(&format!("M{i}"), &format!("Sub P{i}()\nEnd Sub\n")))
            .collect();
        let results = convert_batch(&modules, MappingTables::standard(), &ConvertOptions::default(), &BatchOptions {
            threads: Some(3),
            ..BatchOptions::default()
        });
        let names: Vec<&str> = results.iter().map(|r| r.module_name.as_str()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("M{i}")).collect();
        assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn expired_deadline_marks_every_module() {
        let modules = vec![module("A", "Sub A()\nEnd Sub\n"), module("B", "Sub B()\nEnd Sub\n")];
        let results = convert_batch(&modules, MappingTables::standard(), &ConvertOptions::default(), &BatchOptions {
            timeout: Some(Duration::ZERO),
            threads: None,
        });
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(!result.success);
            assert_eq!(result.notes_with_code(NoteCode::BatchTimeout).count(), 1);
        }
    }
}
