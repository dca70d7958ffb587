//! Bidirectional keyword⇄enum tables.
//!
//! Each table is a single static slice of `(keyword, value)` pairs with
//! one lookup per direction, so the parser and the source generator can
//! never drift apart. Keywords are matched lowercase.

use crate::material::{
    BlendFactor, ClampType, CullType, DeformType, MaterialFlags, StageFlags, SurfaceFlags,
    SurfaceType, TexGenType,
};

pub const SORT_SUBVIEW: f32 = -3.0;
pub const SORT_GUI: f32 = -2.0;
pub const SORT_BAD: f32 = -1.0;
pub const SORT_OPAQUE: f32 = 0.0;
pub const SORT_PORTAL_SKY: f32 = 1.0;
pub const SORT_DECAL: f32 = 2.0;
pub const SORT_FAR: f32 = 3.0;
pub const SORT_MEDIUM: f32 = 4.0;
pub const SORT_CLOSE: f32 = 5.0;
pub const SORT_ALMOST_NEAREST: f32 = 6.0;
pub const SORT_NEAREST: f32 = 7.0;
pub const SORT_AFTER_FOG: f32 = 90.0;
pub const SORT_POST_PROCESS: f32 = 100.0;

pub const PREDEFINED_SORT_VALUES: &[(&str, f32)] = &[
    ("subview", SORT_SUBVIEW),
    ("gui", SORT_GUI),
    ("bad", SORT_BAD),
    ("opaque", SORT_OPAQUE),
    ("portalsky", SORT_PORTAL_SKY),
    ("decal", SORT_DECAL),
    ("far", SORT_FAR),
    ("medium", SORT_MEDIUM),
    ("close", SORT_CLOSE),
    ("almostnearest", SORT_ALMOST_NEAREST),
    ("nearest", SORT_NEAREST),
    ("afterfog", SORT_AFTER_FOG),
    ("postprocess", SORT_POST_PROCESS),
];

pub fn sort_value_for_keyword(keyword: &str) -> Option<f32> {
    PREDEFINED_SORT_VALUES
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_sort_value(value: f32) -> Option<&'static str> {
    PREDEFINED_SORT_VALUES
        .iter()
        .find(|(_, sort)| *sort == value)
        .map(|(name, _)| *name)
}

pub const SURFACE_TYPES: &[(&str, SurfaceType)] = &[
    ("metal", SurfaceType::Metal),
    ("stone", SurfaceType::Stone),
    ("flesh", SurfaceType::Flesh),
    ("wood", SurfaceType::Wood),
    ("cardboard", SurfaceType::Cardboard),
    ("liquid", SurfaceType::Liquid),
    ("glass", SurfaceType::Glass),
    ("plastic", SurfaceType::Plastic),
    ("ricochet", SurfaceType::Ricochet),
    ("surftype10", SurfaceType::Surf10),
    ("surftype11", SurfaceType::Surf11),
    ("surftype12", SurfaceType::Surf12),
    ("surftype13", SurfaceType::Surf13),
    ("surftype14", SurfaceType::Surf14),
    ("surftype15", SurfaceType::Surf15),
];

pub fn surface_type_for_keyword(keyword: &str) -> Option<SurfaceType> {
    SURFACE_TYPES
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_surface_type(surface_type: SurfaceType) -> Option<&'static str> {
    SURFACE_TYPES
        .iter()
        .find(|(_, value)| *value == surface_type)
        .map(|(name, _)| *name)
}

/// Material flags that map 1:1 onto a keyword. `translucent` also
/// affects coverage at parse time, but exports through this table.
pub const MATERIAL_FLAG_KEYWORDS: &[(&str, MaterialFlags)] = &[
    ("noshadows", MaterialFlags::NO_SHADOWS),
    ("noselfshadow", MaterialFlags::NO_SELF_SHADOW),
    ("forceshadows", MaterialFlags::FORCE_SHADOWS),
    ("nooverlays", MaterialFlags::NO_OVERLAYS),
    ("forceoverlays", MaterialFlags::FORCE_OVERLAYS),
    ("forceopaque", MaterialFlags::FORCE_OPAQUE),
    ("nofog", MaterialFlags::NO_FOG),
    ("noportalfog", MaterialFlags::NO_PORTAL_FOG),
    ("unsmoothedtangents", MaterialFlags::UNSMOOTHED_TANGENTS),
    ("mirror", MaterialFlags::MIRROR),
    ("translucent", MaterialFlags::TRANSLUCENT),
    ("islightgemsurf", MaterialFlags::IS_LIGHTGEM_SURF),
];

pub fn material_flag_for_keyword(keyword: &str) -> Option<MaterialFlags> {
    MATERIAL_FLAG_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub const SURFACE_FLAG_KEYWORDS: &[(&str, SurfaceFlags)] = &[
    ("solid", SurfaceFlags::SOLID),
    ("water", SurfaceFlags::WATER),
    ("playerclip", SurfaceFlags::PLAYER_CLIP),
    ("monsterclip", SurfaceFlags::MONSTER_CLIP),
    ("moveableclip", SurfaceFlags::MOVEABLE_CLIP),
    ("ikclip", SurfaceFlags::IK_CLIP),
    ("blood", SurfaceFlags::BLOOD),
    ("trigger", SurfaceFlags::TRIGGER),
    ("aassolid", SurfaceFlags::AAS_SOLID),
    ("aasobstacle", SurfaceFlags::AAS_OBSTACLE),
    ("flashlight_trigger", SurfaceFlags::FLASHLIGHT_TRIGGER),
    ("nonsolid", SurfaceFlags::NON_SOLID),
    ("nullnormal", SurfaceFlags::NULL_NORMAL),
    ("areaportal", SurfaceFlags::AREA_PORTAL),
    ("qer_nocarve", SurfaceFlags::NO_CARVE),
    ("discrete", SurfaceFlags::DISCRETE),
    ("nofragment", SurfaceFlags::NO_FRAGMENT),
    ("slick", SurfaceFlags::SLICK),
    ("collision", SurfaceFlags::COLLISION),
    ("noimpact", SurfaceFlags::NO_IMPACT),
    ("nodamage", SurfaceFlags::NO_DAMAGE),
    ("ladder", SurfaceFlags::LADDER),
    ("nosteps", SurfaceFlags::NO_STEPS),
];

pub fn surface_flag_for_keyword(keyword: &str) -> Option<SurfaceFlags> {
    SURFACE_FLAG_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

/// Stage flags; `highquality` precedes `uncompressed` so the exporter
/// picks it when both keywords map to the same flag.
pub const STAGE_FLAG_KEYWORDS: &[(&str, StageFlags)] = &[
    ("ignorealphatest", StageFlags::IGNORE_ALPHA_TEST),
    ("nearest", StageFlags::FILTER_NEAREST),
    ("linear", StageFlags::FILTER_LINEAR),
    ("highquality", StageFlags::HIGH_QUALITY),
    ("uncompressed", StageFlags::HIGH_QUALITY),
    ("forcehighquality", StageFlags::FORCE_HIGH_QUALITY),
    ("nopicmip", StageFlags::NO_PICMIP),
    ("maskred", StageFlags::MASK_RED),
    ("maskgreen", StageFlags::MASK_GREEN),
    ("maskblue", StageFlags::MASK_BLUE),
    ("maskalpha", StageFlags::MASK_ALPHA),
    ("maskdepth", StageFlags::MASK_DEPTH),
    ("ignoredepth", StageFlags::IGNORE_DEPTH),
];

pub fn stage_flag_for_keyword(keyword: &str) -> Option<StageFlags> {
    STAGE_FLAG_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub const CLAMP_KEYWORDS: &[(&str, ClampType)] = &[
    ("clamp", ClampType::NoRepeat),
    ("zeroclamp", ClampType::ZeroClamp),
    ("alphazeroclamp", ClampType::AlphaZeroClamp),
    ("noclamp", ClampType::Repeat),
];

pub fn clamp_type_for_keyword(keyword: &str) -> Option<ClampType> {
    CLAMP_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_clamp_type(clamp: ClampType) -> Option<&'static str> {
    CLAMP_KEYWORDS
        .iter()
        .find(|(_, value)| *value == clamp)
        .map(|(name, _)| *name)
}

pub const CULL_KEYWORDS: &[(&str, CullType)] = &[
    ("twosided", CullType::None),
    ("backsided", CullType::Front),
];

pub fn cull_type_for_keyword(keyword: &str) -> Option<CullType> {
    CULL_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_cull_type(cull: CullType) -> Option<&'static str> {
    CULL_KEYWORDS
        .iter()
        .find(|(_, value)| *value == cull)
        .map(|(name, _)| *name)
}

pub const TEXGEN_KEYWORDS: &[(&str, TexGenType)] = &[
    ("normal", TexGenType::Normal),
    ("reflect", TexGenType::Reflect),
    ("skybox", TexGenType::Skybox),
    ("wobblesky", TexGenType::WobbleSky),
    ("screen", TexGenType::Screen),
];

pub fn texgen_for_keyword(keyword: &str) -> Option<TexGenType> {
    TEXGEN_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_texgen(texgen: TexGenType) -> Option<&'static str> {
    TEXGEN_KEYWORDS
        .iter()
        .find(|(_, value)| *value == texgen)
        .map(|(name, _)| *name)
}

pub const DEFORM_KEYWORDS: &[(&str, DeformType)] = &[
    ("sprite", DeformType::Sprite),
    ("tube", DeformType::Tube),
    ("flare", DeformType::Flare),
    ("expand", DeformType::Expand),
    ("move", DeformType::Move),
    ("turbulent", DeformType::Turbulent),
    ("eyeball", DeformType::Eyeball),
    ("particle", DeformType::Particle),
    ("particle2", DeformType::Particle2),
];

pub fn deform_for_keyword(keyword: &str) -> Option<DeformType> {
    DEFORM_KEYWORDS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

pub fn keyword_for_deform(deform: DeformType) -> Option<&'static str> {
    DEFORM_KEYWORDS
        .iter()
        .find(|(_, value)| *value == deform)
        .map(|(name, _)| *name)
}

/// Named blend shortcuts and their canonical GL factor pair.
pub const BLEND_SHORTCUTS: &[(&str, (&str, &str))] = &[
    ("blend", ("gl_src_alpha", "gl_one_minus_src_alpha")),
    ("add", ("gl_one", "gl_one")),
    ("filter", ("gl_dst_color", "gl_zero")),
    ("modulate", ("gl_dst_color", "gl_zero")),
    ("none", ("gl_zero", "gl_one")),
];

pub fn blend_shortcut(keyword: &str) -> Option<(&'static str, &'static str)> {
    BLEND_SHORTCUTS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, pair)| *pair)
}

pub const BLEND_FACTORS: &[(&str, BlendFactor)] = &[
    ("gl_one", BlendFactor::One),
    ("gl_zero", BlendFactor::Zero),
    ("gl_src_color", BlendFactor::SrcColour),
    ("gl_one_minus_src_color", BlendFactor::OneMinusSrcColour),
    ("gl_src_alpha", BlendFactor::SrcAlpha),
    ("gl_one_minus_src_alpha", BlendFactor::OneMinusSrcAlpha),
    ("gl_dst_color", BlendFactor::DstColour),
    ("gl_one_minus_dst_color", BlendFactor::OneMinusDstColour),
    ("gl_dst_alpha", BlendFactor::DstAlpha),
    ("gl_one_minus_dst_alpha", BlendFactor::OneMinusDstAlpha),
];

pub fn blend_factor(keyword: &str) -> Option<BlendFactor> {
    BLEND_FACTORS
        .iter()
        .find(|(name, _)| *name == keyword)
        .map(|(_, value)| *value)
}

/// Option keywords accepted in front of a `fragmentMap` path.
pub const FRAGMENT_MAP_OPTIONS: &[&str] = &[
    "cubemap",
    "cameracubemap",
    "nearest",
    "linear",
    "clamp",
    "noclamp",
    "zeroclamp",
    "alphazeroclamp",
    "forcehighquality",
    "uncompressed",
    "highquality",
    "nopicmip",
];
