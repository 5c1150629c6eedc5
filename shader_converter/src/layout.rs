//! Byte layout planning for uniform values.
//!
//! Uniforms from both stages are packed into a single push constant block
//! if the combined size fits within the push constant limit.
//! Larger layouts use a uniform buffer shared by both stages instead.
//! The vertex stage is always planned first, and the fragment stage continues
//! from the vertex stage's offset rounded up to a multiple of 16 bytes.
use std::{cmp::Reverse, str::FromStr};

use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{
    declaration::{Declaration, SymbolTable},
    error::ConvertError,
    interface::{Binding, DescriptorBindings},
};

/// The alignment for the end of each stage's uniform data.
pub const STAGE_ALIGNMENT: u32 = 16;

/// The supported uniform value types in ascending packing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum GlslType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl GlslType {
    pub fn size_in_bytes(self) -> u32 {
        match self {
            GlslType::Int => 4,
            GlslType::Float => 4,
            GlslType::Vec2 => 8,
            GlslType::Vec3 => 12,
            GlslType::Vec4 => 16,
            GlslType::Mat2 => 16,
            GlslType::Mat3 => 36,
            GlslType::Mat4 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingStrategy {
    PushConstant,
    UniformBuffer,
}

impl PackingStrategy {
    /// The instance name used to access block members like `pc.mvp`.
    pub fn accessor(self) -> &'static str {
        match self {
            PackingStrategy::PushConstant => "pc",
            PackingStrategy::UniformBuffer => "ub",
        }
    }
}

/// A uniform placed at a byte offset in the uniform block.
///
/// Offsets use the packed type sizes of [GlslType::size_in_bytes].
/// Push constant members declare this offset explicitly.
/// Uniform buffer members are declared in offset order without offsets,
/// so the offset is only an estimate of the std140 layout used for the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutField {
    pub name: SmolStr,
    pub ty: GlslType,
    pub array_length: Option<u32>,
    pub offset: u32,
}

impl LayoutField {
    /// The size of all elements or `None` if the size overflows.
    pub fn size_in_bytes(&self) -> Option<u32> {
        array_size_in_bytes(self.ty, self.array_length)
    }

    fn arrayed_name(&self) -> String {
        match self.array_length {
            Some(length) => format!("{}[{length}]", self.name),
            None => self.name.to_string(),
        }
    }
}

/// The uniform block declaration for a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniformBlock {
    /// Members with explicit `layout(offset = N)` qualifiers.
    PushConstant { members: String },
    /// Members in offset order for a buffer bound to a descriptor.
    UniformBuffer { binding: Binding, members: String },
}

/// The planned uniform data for a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageLayout {
    /// The uniforms referenced by this stage in offset order.
    pub fields: Vec<LayoutField>,
    pub block: Option<UniformBlock>,
}

/// Layout state carried from the vertex stage to the fragment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlanner {
    strategy: PackingStrategy,
    uniform_buffer: Option<Binding>,
    offset: u32,
    fields: Vec<LayoutField>,
    // Serialized uniform buffer members from previous stages.
    carried_members: String,
}

impl LayoutPlanner {
    /// Choose a packing strategy based on the uniforms used by both stages.
    ///
    /// The uniform buffer binding is allocated immediately if needed,
    /// so sampler bindings allocated afterwards start at the next binding.
    pub fn new(
        vertex: &SymbolTable,
        fragment: &SymbolTable,
        push_constant_limit: u32,
        descriptors: &mut DescriptorBindings,
    ) -> Result<Self, ConvertError> {
        let total = used_bytes(vertex)?
            .checked_add(used_bytes(fragment)?)
            .ok_or_else(|| ConvertError::UniformBlockTooLarge {
                name: fragment.uniforms.keys().last().cloned().unwrap_or_default(),
            })?;
        let strategy = packing_strategy(total, push_constant_limit);

        let uniform_buffer = (strategy == PackingStrategy::UniformBuffer && total > 0)
            .then(|| descriptors.allocate());

        Ok(Self {
            strategy,
            uniform_buffer,
            offset: 0,
            fields: Vec::new(),
            carried_members: String::new(),
        })
    }

    pub fn strategy(&self) -> PackingStrategy {
        self.strategy
    }

    /// The current offset after all planned stages, which is also the total block size.
    pub fn size_in_bytes(&self) -> u32 {
        self.offset
    }

    /// All planned fields across stages in offset order.
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Assign offsets to the uniforms of the next stage in the pipeline.
    pub fn plan_stage(&mut self, symbols: &SymbolTable) -> Result<StageLayout, ConvertError> {
        // Place larger types first to reduce padding.
        // The sort is stable, so equal types keep their declaration order.
        let mut uniforms = typed_uniforms(symbols)?;
        uniforms.sort_by_key(|(_, ty)| Reverse(*ty));

        let mut fields = Vec::new();
        let mut new_members = String::new();
        for (declaration, ty) in uniforms {
            // Uniforms used in both stages share the same data.
            if let Some(existing) = self.fields.iter().find(|f| f.name == declaration.name) {
                if existing.ty != ty || existing.array_length != declaration.array_length {
                    return Err(ConvertError::ConflictingUniform {
                        name: declaration.name.clone(),
                        vertex: format!("{} {}", existing.ty, existing.arrayed_name()).into(),
                        fragment: format!("{ty} {}", declaration.arrayed_name()).into(),
                    });
                }
                fields.push(existing.clone());
                continue;
            }

            let field = LayoutField {
                name: declaration.name.clone(),
                ty,
                array_length: declaration.array_length,
                offset: self.offset,
            };
            self.offset = field
                .size_in_bytes()
                .and_then(|size| self.offset.checked_add(size))
                .ok_or_else(|| too_large(declaration))?;
            new_members += &member(&field, self.strategy);

            self.fields.push(field.clone());
            fields.push(field);
        }
        fields.sort_by_key(|f| f.offset);

        self.offset = self
            .offset
            .checked_next_multiple_of(STAGE_ALIGNMENT)
            .ok_or_else(|| ConvertError::UniformBlockTooLarge {
                name: fields.last().map(|f| f.name.clone()).unwrap_or_default(),
            })?;

        let block = match (self.strategy, self.uniform_buffer) {
            (PackingStrategy::UniformBuffer, Some(binding)) => {
                // Each stage declares all members from previous stages.
                self.carried_members += &new_members;
                (!self.carried_members.is_empty()).then(|| UniformBlock::UniformBuffer {
                    binding,
                    members: self.carried_members.clone(),
                })
            }
            _ => (!fields.is_empty()).then(|| UniformBlock::PushConstant {
                members: fields.iter().map(|f| member(f, self.strategy)).collect(),
            }),
        };

        Ok(StageLayout { fields, block })
    }
}

/// Select [PackingStrategy::PushConstant] only if `total_bytes` fits within `push_constant_limit`.
pub fn packing_strategy(total_bytes: u32, push_constant_limit: u32) -> PackingStrategy {
    if total_bytes <= push_constant_limit {
        PackingStrategy::PushConstant
    } else {
        PackingStrategy::UniformBuffer
    }
}

/// The combined size of all uniforms in `symbols` without any padding.
pub fn used_bytes(symbols: &SymbolTable) -> Result<u32, ConvertError> {
    typed_uniforms(symbols)?
        .into_iter()
        .try_fold(0u32, |total, (d, ty)| {
            array_size_in_bytes(ty, d.array_length)
                .and_then(|size| total.checked_add(size))
                .ok_or_else(|| too_large(d))
        })
}

fn array_size_in_bytes(ty: GlslType, array_length: Option<u32>) -> Option<u32> {
    ty.size_in_bytes().checked_mul(array_length.unwrap_or(1))
}

fn too_large(declaration: &Declaration) -> ConvertError {
    ConvertError::UniformBlockTooLarge {
        name: declaration.name.clone(),
    }
}

fn typed_uniforms(symbols: &SymbolTable) -> Result<Vec<(&Declaration, GlslType)>, ConvertError> {
    symbols
        .uniforms
        .values()
        .map(|d| {
            GlslType::from_str(&d.ty)
                .map(|ty| (d, ty))
                .map_err(|_| ConvertError::UnknownType {
                    name: d.name.clone(),
                    ty: d.ty.clone(),
                })
        })
        .collect()
}

fn member(field: &LayoutField, strategy: PackingStrategy) -> String {
    match strategy {
        PackingStrategy::PushConstant => format!(
            "    layout(offset = {}) {} {};\n",
            field.offset,
            field.ty,
            field.arrayed_name()
        ),
        PackingStrategy::UniformBuffer => format!("    {} {};\n", field.ty, field.arrayed_name()),
    }
}
