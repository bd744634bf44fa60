//! Builtin function catalog.
//!
//! A static, read-only table of the shading language's builtin functions
//! and their classification predicates. Nothing in the compiler mutates
//! it, so it is safe to share between concurrent pipeline runs.

use std::fmt;

macro_rules! builtin_fns {
    ($($variant:ident => $name:literal,)*) => {
        /// A builtin function of the shading language.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum BuiltinFn {
            $($variant,)*
        }

        impl BuiltinFn {
            /// Every builtin, in declaration order.
            pub const ALL: &'static [BuiltinFn] = &[$(BuiltinFn::$variant,)*];

            /// The source-level spelling of the builtin.
            pub fn name(self) -> &'static str {
                match self {
                    $(BuiltinFn::$variant => $name,)*
                }
            }
        }
    };
}

builtin_fns! {
    Abs => "abs",
    Acos => "acos",
    All => "all",
    Any => "any",
    ArrayLength => "arrayLength",
    Asin => "asin",
    Atan => "atan",
    Atan2 => "atan2",
    Ceil => "ceil",
    Clamp => "clamp",
    Cos => "cos",
    CountLeadingZeros => "countLeadingZeros",
    CountOneBits => "countOneBits",
    CountTrailingZeros => "countTrailingZeros",
    Cross => "cross",
    Distance => "distance",
    Dot => "dot",
    Dot4I8Packed => "dot4I8Packed",
    Dot4U8Packed => "dot4U8Packed",
    Dpdx => "dpdx",
    DpdxCoarse => "dpdxCoarse",
    DpdxFine => "dpdxFine",
    Dpdy => "dpdy",
    DpdyCoarse => "dpdyCoarse",
    DpdyFine => "dpdyFine",
    Exp => "exp",
    Exp2 => "exp2",
    Floor => "floor",
    Fract => "fract",
    Fwidth => "fwidth",
    FwidthCoarse => "fwidthCoarse",
    FwidthFine => "fwidthFine",
    Length => "length",
    Log => "log",
    Log2 => "log2",
    Max => "max",
    Min => "min",
    Mix => "mix",
    Normalize => "normalize",
    Pack2X16Float => "pack2x16float",
    Pack2X16Snorm => "pack2x16snorm",
    Pack2X16Unorm => "pack2x16unorm",
    Pack4X8Snorm => "pack4x8snorm",
    Pack4X8Unorm => "pack4x8unorm",
    Pack4XI8 => "pack4xI8",
    Pack4XU8 => "pack4xU8",
    Pow => "pow",
    ReverseBits => "reverseBits",
    Round => "round",
    Select => "select",
    Sign => "sign",
    Sin => "sin",
    Sqrt => "sqrt",
    Step => "step",
    StorageBarrier => "storageBarrier",
    Tan => "tan",
    Transpose => "transpose",
    Trunc => "trunc",
    Unpack2X16Float => "unpack2x16float",
    Unpack2X16Snorm => "unpack2x16snorm",
    Unpack2X16Unorm => "unpack2x16unorm",
    Unpack4X8Snorm => "unpack4x8snorm",
    Unpack4X8Unorm => "unpack4x8unorm",
    Unpack4XI8 => "unpack4xI8",
    Unpack4XU8 => "unpack4xU8",
    WorkgroupBarrier => "workgroupBarrier",
    TextureBarrier => "textureBarrier",
    TextureDimensions => "textureDimensions",
    TextureGather => "textureGather",
    TextureLoad => "textureLoad",
    TextureNumLayers => "textureNumLayers",
    TextureNumLevels => "textureNumLevels",
    TextureNumSamples => "textureNumSamples",
    TextureSample => "textureSample",
    TextureSampleLevel => "textureSampleLevel",
    TextureStore => "textureStore",
    AtomicLoad => "atomicLoad",
    AtomicStore => "atomicStore",
    AtomicAdd => "atomicAdd",
    AtomicSub => "atomicSub",
    AtomicMax => "atomicMax",
    AtomicMin => "atomicMin",
    AtomicAnd => "atomicAnd",
    AtomicOr => "atomicOr",
    AtomicXor => "atomicXor",
    AtomicExchange => "atomicExchange",
    AtomicCompareExchangeWeak => "atomicCompareExchangeWeak",
    SubgroupBallot => "subgroupBallot",
    SubgroupBroadcast => "subgroupBroadcast",
    SubgroupAdd => "subgroupAdd",
}

impl BuiltinFn {
    /// Look up a builtin by its source spelling.
    pub fn parse(name: &str) -> Option<BuiltinFn> {
        BuiltinFn::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn is_coarse_derivative(self) -> bool {
        matches!(
            self,
            BuiltinFn::DpdxCoarse | BuiltinFn::DpdyCoarse | BuiltinFn::FwidthCoarse
        )
    }

    pub fn is_fine_derivative(self) -> bool {
        matches!(
            self,
            BuiltinFn::DpdxFine | BuiltinFn::DpdyFine | BuiltinFn::FwidthFine
        )
    }

    pub fn is_derivative(self) -> bool {
        matches!(self, BuiltinFn::Dpdx | BuiltinFn::Dpdy | BuiltinFn::Fwidth)
            || self.is_coarse_derivative()
            || self.is_fine_derivative()
    }

    pub fn is_image_query(self) -> bool {
        matches!(
            self,
            BuiltinFn::TextureDimensions
                | BuiltinFn::TextureNumLayers
                | BuiltinFn::TextureNumLevels
                | BuiltinFn::TextureNumSamples
        )
    }

    pub fn is_texture(self) -> bool {
        self.is_image_query()
            || matches!(
                self,
                BuiltinFn::TextureGather
                    | BuiltinFn::TextureLoad
                    | BuiltinFn::TextureSample
                    | BuiltinFn::TextureSampleLevel
                    | BuiltinFn::TextureStore
            )
    }

    pub fn is_data_packing(self) -> bool {
        matches!(
            self,
            BuiltinFn::Pack4X8Snorm
                | BuiltinFn::Pack4X8Unorm
                | BuiltinFn::Pack2X16Snorm
                | BuiltinFn::Pack2X16Unorm
                | BuiltinFn::Pack2X16Float
        )
    }

    pub fn is_data_unpacking(self) -> bool {
        matches!(
            self,
            BuiltinFn::Unpack4X8Snorm
                | BuiltinFn::Unpack4X8Unorm
                | BuiltinFn::Unpack2X16Snorm
                | BuiltinFn::Unpack2X16Unorm
                | BuiltinFn::Unpack2X16Float
        )
    }

    pub fn is_barrier(self) -> bool {
        matches!(
            self,
            BuiltinFn::WorkgroupBarrier | BuiltinFn::StorageBarrier | BuiltinFn::TextureBarrier
        )
    }

    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            BuiltinFn::AtomicLoad
                | BuiltinFn::AtomicStore
                | BuiltinFn::AtomicAdd
                | BuiltinFn::AtomicSub
                | BuiltinFn::AtomicMax
                | BuiltinFn::AtomicMin
                | BuiltinFn::AtomicAnd
                | BuiltinFn::AtomicOr
                | BuiltinFn::AtomicXor
                | BuiltinFn::AtomicExchange
                | BuiltinFn::AtomicCompareExchangeWeak
        )
    }

    pub fn is_packed_4x8_integer_dot_product(self) -> bool {
        matches!(
            self,
            BuiltinFn::Dot4I8Packed
                | BuiltinFn::Dot4U8Packed
                | BuiltinFn::Pack4XI8
                | BuiltinFn::Pack4XU8
                | BuiltinFn::Unpack4XI8
                | BuiltinFn::Unpack4XU8
        )
    }

    pub fn is_subgroup(self) -> bool {
        matches!(
            self,
            BuiltinFn::SubgroupBallot | BuiltinFn::SubgroupBroadcast | BuiltinFn::SubgroupAdd
        )
    }

    /// Builtins whose call cannot be removed even if the result is unused.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            BuiltinFn::AtomicAdd
                | BuiltinFn::AtomicAnd
                | BuiltinFn::AtomicCompareExchangeWeak
                | BuiltinFn::AtomicExchange
                | BuiltinFn::AtomicMax
                | BuiltinFn::AtomicMin
                | BuiltinFn::AtomicOr
                | BuiltinFn::AtomicStore
                | BuiltinFn::AtomicSub
                | BuiltinFn::AtomicXor
                | BuiltinFn::TextureStore
        )
    }
}

impl fmt::Display for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
