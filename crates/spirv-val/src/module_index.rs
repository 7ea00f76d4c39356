//! Read-only lookup tables over a parsed module.
//!
//! Everything the checks ask about ids ("what defines this?", "what is its
//! type?", "which entry points reach it?") is answered from here in constant
//! time. The index is built once per validation run and never mutated.

use crate::error::{Result, ValidationError};
use crate::spirv_type::SpirvType;
use rspirv::dr::{Instruction, Module, Operand};
use rspirv::spirv::{Capability, ExecutionModel, Op, StorageClass, Word};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// The instruction defining an id.
#[derive(Copy, Clone, Debug)]
pub struct Def<'m> {
    pub inst: &'m Instruction,
    /// Index of the defining instruction in binary order.
    pub position: usize,
    /// The function whose body contains the definition, `None` for globals.
    pub function: Option<Word>,
}

/// An operand of a function body instruction referring to some id.
#[derive(Copy, Clone, Debug)]
pub struct Use<'m> {
    pub inst: &'m Instruction,
    /// Index into `inst.operands`, not counting result type and result id.
    pub operand: usize,
}

#[derive(Clone, Debug)]
pub struct EntryPoint<'m> {
    pub inst: &'m Instruction,
    pub model: ExecutionModel,
    pub function: Word,
    pub name: &'m str,
    pub interface: SmallVec<[Word; 8]>,
}

pub struct ModuleIndex<'m> {
    module: &'m Module,
    version: (u8, u8),
    defs: FxHashMap<Word, Def<'m>>,
    capabilities: FxHashSet<Capability>,
    extensions: FxHashSet<&'m str>,
    entry_points: Vec<EntryPoint<'m>>,
    uses: FxHashMap<Word, SmallVec<[Use<'m>; 2]>>,
    /// For every id mentioned in a function body: the entry point functions
    /// whose static call tree contains such a function, in entry point order.
    entry_point_refs: FxHashMap<Word, SmallVec<[Word; 2]>>,
    names: FxHashMap<Word, &'m str>,
}

impl<'m> ModuleIndex<'m> {
    pub fn new(module: &'m Module) -> Result<Self> {
        // Headerless modules are treated as 1.0.
        let version = module.header.as_ref().map_or((1, 0), |h| h.version());

        let mut defs = FxHashMap::default();
        let mut uses: FxHashMap<Word, SmallVec<[Use<'m>; 2]>> = FxHashMap::default();
        let mut function_refs: FxHashMap<Word, FxHashSet<Word>> = FxHashMap::default();
        let mut callees: FxHashMap<Word, SmallVec<[Word; 4]>> = FxHashMap::default();

        let mut current_function = None;
        for (position, inst) in module.all_inst_iter().enumerate() {
            if inst.class.opcode == Op::Function {
                current_function = inst.result_id;
            }
            if let Some(id) = inst.result_id {
                let def = Def {
                    inst,
                    position,
                    function: current_function,
                };
                if defs.insert(id, def).is_some() {
                    return Err(ValidationError::invalid_binary(format!(
                        "ID {id} has already been defined"
                    ))
                    .at(id));
                }
            }
            if let Some(function) = current_function {
                let refs = function_refs.entry(function).or_default();
                for (operand, id) in inst
                    .operands
                    .iter()
                    .enumerate()
                    .filter_map(|(i, op)| Some((i, op.id_ref_any()?)))
                {
                    refs.insert(id);
                    uses.entry(id).or_default().push(Use { inst, operand });
                }
                if inst.class.opcode == Op::FunctionCall {
                    if let Some(callee) = inst.operands.first().and_then(Operand::id_ref_any) {
                        callees.entry(function).or_default().push(callee);
                    }
                }
            }
            if inst.class.opcode == Op::FunctionEnd {
                current_function = None;
            }
        }

        let capabilities = module
            .capabilities
            .iter()
            .filter_map(|inst| match inst.operands.first() {
                Some(&Operand::Capability(cap)) => Some(cap),
                _ => None,
            })
            .collect();
        let extensions = module
            .extensions
            .iter()
            .filter_map(|inst| match inst.operands.first() {
                Some(Operand::LiteralString(name)) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        let mut entry_points = Vec::with_capacity(module.entry_points.len());
        for inst in &module.entry_points {
            let (model, function) = match (
                inst.operands.first(),
                inst.operands.get(1).and_then(Operand::id_ref_any),
            ) {
                (Some(&Operand::ExecutionModel(model)), Some(function)) => (model, function),
                _ => {
                    return Err(ValidationError::invalid_binary(
                        "OpEntryPoint is missing its execution model or function operand",
                    ));
                }
            };
            let name = match inst.operands.get(2) {
                Some(Operand::LiteralString(name)) => name.as_str(),
                _ => "",
            };
            let interface = inst
                .operands
                .iter()
                .skip(3)
                .filter_map(Operand::id_ref_any)
                .collect();
            entry_points.push(EntryPoint {
                inst,
                model,
                function,
                name,
                interface,
            });
        }

        let entry_point_refs = collect_entry_point_refs(&entry_points, &function_refs, &callees);

        let names = entry_points
            .iter()
            .map(|entry| (entry.function, entry.name))
            .chain(module.debug_names.iter().filter_map(|inst| {
                match (inst.class.opcode, inst.operands.as_slice()) {
                    (Op::Name, [Operand::IdRef(target), Operand::LiteralString(name)]) => {
                        Some((*target, name.as_str()))
                    }
                    _ => None,
                }
            }))
            .collect();

        Ok(Self {
            module,
            version,
            defs,
            capabilities,
            extensions,
            entry_points,
            uses,
            entry_point_refs,
            names,
        })
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn def(&self, id: Word) -> Option<&Def<'m>> {
        self.defs.get(&id)
    }

    pub fn inst(&self, id: Word) -> Option<&'m Instruction> {
        self.defs.get(&id).map(|def| def.inst)
    }

    pub fn opcode(&self, id: Word) -> Option<Op> {
        self.inst(id).map(|inst| inst.class.opcode)
    }

    /// The result type of the instruction defining `id`.
    pub fn type_of(&self, id: Word) -> Option<Word> {
        self.inst(id).and_then(|inst| inst.result_type)
    }

    /// Decoded view of the type declared by `id`, `None` if `id` isn't a type.
    pub fn ty(&self, id: Word) -> Option<SpirvType<'m>> {
        self.inst(id).and_then(SpirvType::from_inst)
    }

    pub fn entry_points(&self) -> &[EntryPoint<'m>] {
        &self.entry_points
    }

    /// Function body instructions consuming `id`.
    pub fn uses(&self, id: Word) -> &[Use<'m>] {
        self.uses.get(&id).map_or(&[], |uses| uses.as_slice())
    }

    /// Entry point functions that statically use `id`, i.e. whose call tree
    /// contains a function mentioning it.
    pub fn entry_point_references(&self, id: Word) -> &[Word] {
        self.entry_point_refs
            .get(&id)
            .map_or(&[], |functions| functions.as_slice())
    }

    pub fn name(&self, id: Word) -> Option<&'m str> {
        self.names.get(&id).copied()
    }

    /// Name used in logs, e.g. `%12("main")`.
    pub fn display_id(&self, id: Word) -> String {
        match self.name(id) {
            Some(name) => format!("%{id}({name:?})"),
            None => format!("%{id}"),
        }
    }

    /// Storage class of an `OpVariable`.
    pub fn variable_storage_class(&self, id: Word) -> Option<StorageClass> {
        let inst = self.inst(id)?;
        if inst.class.opcode != Op::Variable {
            return None;
        }
        match inst.operands.first() {
            Some(&Operand::StorageClass(storage_class)) => Some(storage_class),
            _ => None,
        }
    }

    /// For a pointer-typed object (variable, function parameter, ...), the
    /// storage class and pointee type of its pointer type.
    pub fn pointer_info(&self, id: Word) -> Option<(StorageClass, Word)> {
        match self.ty(self.type_of(id)?)? {
            SpirvType::Pointer {
                storage_class,
                pointee,
            } => Some((storage_class, pointee)),
            _ => None,
        }
    }

    /// Strips any number of array levels off `id`.
    pub fn strip_arrays(&self, mut id: Word) -> Word {
        // A malformed module could chain arrays into a cycle, so bound the walk
        // by the number of definitions.
        for _ in 0..=self.defs.len() {
            match self.ty(id).and_then(|ty| ty.array_element()) {
                Some(element) => id = element,
                None => break,
            }
        }
        id
    }

    /// Value of an integer `OpConstant` that fits 32 bits. Specialization
    /// constants and anything else yield `None`.
    pub fn eval_u32_constant(&self, id: Word) -> Option<u32> {
        let inst = self.inst(id)?;
        if inst.class.opcode != Op::Constant {
            return None;
        }
        if !matches!(self.ty(inst.result_type?)?, SpirvType::Integer(..)) {
            return None;
        }
        match inst.operands.first()? {
            &Operand::LiteralBit32(value) => Some(value),
            &Operand::LiteralBit64(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    /// Whether `id` is an int/float scalar, or a vector of them, and if so its
    /// component width in bits and component count.
    pub fn numeric_shape(&self, id: Word) -> Option<(SpirvType<'m>, u32, u32)> {
        match self.ty(id)? {
            scalar @ (SpirvType::Integer(width, _) | SpirvType::Float(width)) => {
                Some((scalar, width, 1))
            }
            SpirvType::Vector { element, count } => {
                let component = self.ty(element)?;
                Some((component, component.scalar_width()?, count))
            }
            _ => None,
        }
    }
}

/// Walks the static call graph from every entry point with an explicit stack,
/// recording which entry points reach each referenced id.
fn collect_entry_point_refs(
    entry_points: &[EntryPoint<'_>],
    function_refs: &FxHashMap<Word, FxHashSet<Word>>,
    callees: &FxHashMap<Word, SmallVec<[Word; 4]>>,
) -> FxHashMap<Word, SmallVec<[Word; 2]>> {
    let mut entry_point_refs: FxHashMap<Word, SmallVec<[Word; 2]>> = FxHashMap::default();
    let mut seen_entry_functions = FxHashSet::default();
    for entry in entry_points {
        if !seen_entry_functions.insert(entry.function) {
            continue;
        }
        let mut visited = FxHashSet::default();
        let mut stack = vec![entry.function];
        let mut reached_ids = FxHashSet::default();
        while let Some(function) = stack.pop() {
            if !visited.insert(function) {
                continue;
            }
            if let Some(refs) = function_refs.get(&function) {
                reached_ids.extend(refs.iter().copied());
            }
            if let Some(calls) = callees.get(&function) {
                stack.extend(calls.iter().copied().filter(|f| !visited.contains(f)));
            }
        }
        for id in reached_ids {
            entry_point_refs.entry(id).or_default().push(entry.function);
        }
    }
    entry_point_refs
}
