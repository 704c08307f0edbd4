#![no_main]

use libfuzzer_sys::fuzz_target;
use vba2py_model::{ModuleKind, ModuleOrigin, RawModule};

const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let rest = &rest[..rest.len().min(MAX_INPUT_BYTES)];
    let source = String::from_utf8_lossy(rest);
    let kind = match selector % 3 {
        0 => ModuleKind::StandardModule,
        1 => ModuleKind::ClassModule,
        _ => ModuleKind::DocumentModule,
    };
    let module = RawModule::new("Fuzz", source.into_owned(), ModuleOrigin::CompoundProject);
    let result = vba2py_transpile::convert(&module, kind);
    if !result.success {
        assert!(result.generated_code.is_empty());
        assert!(result.has_warnings());
    }
});
