use crate::checks::{
    CheckContext, check_buffers, check_builtin_structs, check_multiplicity, check_targets,
};
use crate::decoration::DecorationTable;
use crate::entry_interface::check_entry_points;
use crate::error::{Result, ValidationError};
use crate::module_index::ModuleIndex;
use rspirv::dr::Module;
use spirv_val_types::ValidatorOptions;
use tracing::{debug, debug_span};

/// Validates the decorations of `module` and the memory layout of its
/// blocks, stopping at the first violation. On success the decoration table
/// is handed back for later passes to query.
pub fn validate_decorations(
    module: &Module,
    options: &ValidatorOptions,
) -> Result<DecorationTable> {
    let _span = debug_span!("validate_decorations", env = %options.target_env.as_str()).entered();

    let version = module.header.as_ref().map_or((1, 0), |header| header.version());
    let ceiling = options.target_env.spirv_version();
    if version > ceiling {
        return Err(ValidationError::wrong_version(format!(
            "Invalid SPIR-V binary version {}.{} for target environment {} \
             (at most {}.{} is allowed)",
            version.0,
            version.1,
            options.target_env.as_str(),
            ceiling.0,
            ceiling.1
        )));
    }

    let index = debug_span!("index").in_scope(|| ModuleIndex::new(module))?;
    let table = debug_span!("decoration_table").in_scope(|| DecorationTable::build(&index))?;
    let cx = CheckContext::new(&index, &table, options);

    debug_span!("targets").in_scope(|| check_targets(cx))?;
    debug_span!("multiplicity").in_scope(|| check_multiplicity(cx))?;
    debug_span!("builtin_structs").in_scope(|| check_builtin_structs(cx))?;
    debug_span!("buffers").in_scope(|| check_buffers(cx))?;
    debug_span!("entry_points").in_scope(|| check_entry_points(cx))?;

    debug!("module is valid");
    Ok(table)
}
