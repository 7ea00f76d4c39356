//! Decoration and explicit memory-layout validation for SPIR-V modules.
//!
//! [`validate_decorations`] checks a parsed [`rspirv::dr::Module`]: which ids
//! each decoration may target, how often it may appear, whether `Block` and
//! `BufferBlock` structs follow the layout rules of their storage class, and
//! what the interface of each entry point may contain. The first violation
//! is returned as a [`ValidationError`]; on success the [`DecorationTable`]
//! is handed back so later passes can query decorations without rescanning.
//!
//! ```no_run
//! use spirv_val::{SpirvTargetEnv, ValidatorOptions};
//!
//! # fn main() -> Result<(), spirv_val::ValidationError> {
//! let bytes = std::fs::read("shader.spv").unwrap();
//! let options = ValidatorOptions::new(SpirvTargetEnv::Vulkan_1_2).with_scalar_block_layout(true);
//! spirv_val::validate_bytes(&bytes, &options)?;
//! # Ok(())
//! # }
//! ```

// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

mod checks;
mod decoration;
mod entry_interface;
mod error;
mod layout;
mod logging;
mod module_index;
mod spirv_type;
mod validate;
mod vuid;


pub use decoration::{Decoration, DecorationParam, DecorationTable};
pub use error::{ErrorKind, Result, ValidationError};
pub use layout::{BlockRules, LayoutPolicy, MAX_TYPE_DEPTH, Packing};
pub use logging::{LOG_COLOR_ENV, LOG_ENV, LOG_FORMAT_ENV, LoggingError, init_logging};
pub use spirv_val_types::{SpirvTargetEnv, ValidatorOptions};
pub use validate::validate_decorations;

use rspirv::dr::Module;

fn parse_error(err: rspirv::binary::ParseState) -> ValidationError {
    ValidationError::invalid_binary(format!("failed to parse SPIR-V binary: {err:?}"))
}

/// Parses a SPIR-V binary given as words, then validates it.
pub fn validate_words(
    words: &[u32],
    options: &ValidatorOptions,
) -> Result<(Module, DecorationTable)> {
    let module = rspirv::dr::load_words(words).map_err(parse_error)?;
    let table = validate_decorations(&module, options)?;
    Ok((module, table))
}

/// Parses a little-endian SPIR-V binary, then validates it.
pub fn validate_bytes(
    bytes: &[u8],
    options: &ValidatorOptions,
) -> Result<(Module, DecorationTable)> {
    let module = rspirv::dr::load_bytes(bytes).map_err(parse_error)?;
    let table = validate_decorations(&module, options)?;
    Ok((module, table))
}
