//! The structured material model.
//!
//! A `Material` owns the raw declaration body and parses it into a
//! `MaterialDef` on first access. All mutating setters require `&mut
//! self` and flip the modified flag; the read path is `&self` and can
//! be shared with render threads.

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::expr::Expression;
use crate::parser;
use crate::writer;

pub const SORT_UNDEFINED: f32 = -99999.0;

bitflags! {
    /// Material-level flags, mostly 1:1 with declaration keywords.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MaterialFlags: u32 {
        const NO_SHADOWS          = 1 << 0;
        const NO_SELF_SHADOW      = 1 << 1;
        const FORCE_SHADOWS       = 1 << 2;
        const NO_OVERLAYS         = 1 << 3;
        const FORCE_OVERLAYS      = 1 << 4;
        const FORCE_OPAQUE        = 1 << 5;
        const NO_FOG              = 1 << 6;
        const NO_PORTAL_FOG       = 1 << 7;
        const UNSMOOTHED_TANGENTS = 1 << 8;
        const MIRROR              = 1 << 9;
        const TRANSLUCENT         = 1 << 10;
        const IS_LIGHTGEM_SURF    = 1 << 11;
        const POLYGON_OFFSET      = 1 << 12;
        const HAS_SORT_DEFINED    = 1 << 13;
    }
}

bitflags! {
    /// Surface behaviour flags (collision, game feedback, portals).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SurfaceFlags: u32 {
        const SOLID              = 1 << 0;
        const OPAQUE             = 1 << 1;
        const WATER              = 1 << 2;
        const PLAYER_CLIP        = 1 << 3;
        const MONSTER_CLIP       = 1 << 4;
        const MOVEABLE_CLIP      = 1 << 5;
        const IK_CLIP            = 1 << 6;
        const BLOOD              = 1 << 7;
        const TRIGGER            = 1 << 8;
        const AAS_SOLID          = 1 << 9;
        const AAS_OBSTACLE       = 1 << 10;
        const FLASHLIGHT_TRIGGER = 1 << 11;
        const NON_SOLID          = 1 << 12;
        const NULL_NORMAL        = 1 << 13;
        const AREA_PORTAL        = 1 << 14;
        const NO_CARVE           = 1 << 15;
        const DISCRETE           = 1 << 16;
        const NO_FRAGMENT        = 1 << 17;
        const SLICK              = 1 << 18;
        const COLLISION          = 1 << 19;
        const NO_IMPACT          = 1 << 20;
        const NO_DAMAGE          = 1 << 21;
        const LADDER             = 1 << 22;
        const NO_STEPS           = 1 << 23;
        const GUI_SURF           = 1 << 24;
        const ENTITY_GUI         = 1 << 25;
        const ENTITY_GUI2        = 1 << 26;
        const ENTITY_GUI3        = 1 << 27;
    }
}

bitflags! {
    /// Per-stage flags (filtering, quality, channel masking).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StageFlags: u32 {
        const IGNORE_ALPHA_TEST  = 1 << 0;
        const FILTER_NEAREST     = 1 << 1;
        const FILTER_LINEAR      = 1 << 2;
        const HIGH_QUALITY       = 1 << 3;
        const FORCE_HIGH_QUALITY = 1 << 4;
        const NO_PICMIP          = 1 << 5;
        const MASK_RED           = 1 << 6;
        const MASK_GREEN         = 1 << 7;
        const MASK_BLUE          = 1 << 8;
        const MASK_ALPHA         = 1 << 9;
        const MASK_DEPTH         = 1 << 10;
        const IGNORE_DEPTH       = 1 << 11;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullType {
    #[default]
    Back,
    Front,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClampType {
    #[default]
    Repeat,
    NoRepeat,
    ZeroClamp,
    AlphaZeroClamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceType {
    #[default]
    Default,
    Metal,
    Stone,
    Flesh,
    Wood,
    Cardboard,
    Liquid,
    Glass,
    Plastic,
    Ricochet,
    Surf10,
    Surf11,
    Surf12,
    Surf13,
    Surf14,
    Surf15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coverage {
    #[default]
    Undetermined,
    Opaque,
    Perforated,
    Translucent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageType {
    #[default]
    Blend,
    Diffuse,
    Bump,
    Specular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapType {
    #[default]
    Map,
    CubeMap,
    CameraCubeMap,
    VideoMap {
        looping: bool,
    },
    SoundMap {
        waveform: bool,
    },
    RemoteRenderMap,
    MirrorRenderMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexGenType {
    #[default]
    Normal,
    Reflect,
    Skybox,
    WobbleSky,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexColourMode {
    #[default]
    None,
    Multiply,
    InverseMultiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    Translate,
    Scale,
    CenterScale,
    Shear,
    Rotate,
}

/// One texture-matrix step; order matters, so stages keep a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub kind: TransformType,
    pub expressions: Vec<Expression>,
}

/// GL-style blend factors resolved from the stored blend strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    One,
    Zero,
    SrcColour,
    OneMinusSrcColour,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColour,
    OneMinusDstColour,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourComponent {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

/// `vertexParm <index> <e1>[, e2][, e3][, e4]`
#[derive(Debug, Clone, PartialEq)]
pub struct VertexParm {
    pub index: usize,
    pub expressions: Vec<Expression>,
}

/// `fragmentMap <index> [options] <map>`
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentMap {
    pub index: usize,
    pub options: Vec<String>,
    pub map: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecalInfo {
    pub stay_ms: i32,
    pub fade_ms: i32,
    pub start_colour: [f32; 4],
    pub end_colour: [f32; 4],
}

impl Default for DecalInfo {
    fn default() -> Self {
        Self {
            stay_ms: 0,
            fade_ms: 0,
            start_colour: [1.0, 1.0, 1.0, 1.0],
            end_colour: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeformType {
    #[default]
    None,
    Sprite,
    Tube,
    Flare,
    Expand,
    Move,
    Turbulent,
    Eyeball,
    Particle,
    Particle2,
}

/// One render pass inside a material.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stage {
    pub stage_type: StageType,
    pub map_type: MapType,
    /// Map expression text (`textures/a`, `addnormals(a, b)`, a video
    /// path, or the camera-cube prefix).
    pub map: Option<String>,
    /// Blend strings exactly as parsed; the second is empty for named
    /// shortcuts like `add`.
    pub blend_strings: (String, String),
    /// Explicit per-stage clamping; `None` inherits the material.
    pub clamp: Option<ClampType>,
    pub texgen: TexGenType,
    pub texgen_expressions: Vec<Expression>,
    pub transforms: Vec<Transformation>,
    pub colour: [Option<Expression>; 4],
    /// The stage was declared with the `colored` shortcut.
    pub colored: bool,
    pub vertex_colour_mode: VertexColourMode,
    pub condition: Option<Expression>,
    pub alpha_test: Option<Expression>,
    pub flags: StageFlags,
    pub private_polygon_offset: f32,
    pub vertex_program: String,
    pub fragment_program: String,
    pub vertex_parms: Vec<VertexParm>,
    pub fragment_maps: Vec<FragmentMap>,
    pub render_map_size: Option<(i32, i32)>,
}

impl Stage {
    /// A stage only makes it into the material if it binds something.
    pub fn has_content(&self) -> bool {
        self.map.is_some()
            || matches!(
                self.map_type,
                MapType::SoundMap { .. } | MapType::RemoteRenderMap | MapType::MirrorRenderMap
            )
            || !self.vertex_program.is_empty()
            || !self.fragment_program.is_empty()
    }

    pub fn has_alpha_test(&self) -> bool {
        self.alpha_test.is_some()
    }

    pub fn set_colour_component(&mut self, component: ColourComponent, expr: Expression) {
        self.colour[component as usize] = Some(expr);
    }

    /// The resolved blend function of this stage. Interaction stages
    /// have fixed blending; named shortcuts expand through the keyword
    /// table.
    pub fn blend_func(&self) -> (BlendFactor, BlendFactor) {
        use crate::keywords;

        match self.stage_type {
            StageType::Diffuse | StageType::Bump | StageType::Specular => {
                return (BlendFactor::One, BlendFactor::Zero);
            }
            StageType::Blend => {}
        }

        let (src, dst) = (
            self.blend_strings.0.to_lowercase(),
            self.blend_strings.1.to_lowercase(),
        );

        if dst.is_empty() {
            if let Some((s, d)) = keywords::blend_shortcut(&src) {
                return (
                    keywords::blend_factor(s).unwrap_or(BlendFactor::One),
                    keywords::blend_factor(d).unwrap_or(BlendFactor::Zero),
                );
            }
            return (BlendFactor::One, BlendFactor::Zero);
        }

        (
            keywords::blend_factor(&src).unwrap_or(BlendFactor::One),
            keywords::blend_factor(&dst).unwrap_or(BlendFactor::Zero),
        )
    }

    /// Default map expression for a freshly added stage of a type.
    pub(crate) fn default_map_for(stage_type: StageType) -> Option<String> {
        match stage_type {
            StageType::Diffuse => Some("_white".to_string()),
            StageType::Bump => Some("_flat".to_string()),
            StageType::Specular => Some("_black".to_string()),
            StageType::Blend => None,
        }
    }
}

/// The parsed material-level properties plus the ordered stage list.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDef {
    pub description: String,
    pub editor_image: Option<String>,
    pub material_flags: MaterialFlags,
    pub cull_type: CullType,
    pub clamp_type: ClampType,
    pub surface_flags: SurfaceFlags,
    pub surface_type: SurfaceType,
    /// The gui path from `guisurf <path>`; empty for the entity forms.
    pub gui_decl_name: String,
    pub sort: f32,
    pub polygon_offset: f32,
    pub spectrum: i32,
    pub decal_info: DecalInfo,
    pub has_decal_info: bool,
    pub deform_type: DeformType,
    pub deform_expressions: Vec<Expression>,
    pub deform_decl_name: String,
    pub renderbump_arguments: String,
    pub renderbump_flat_arguments: String,
    pub ambient_light: bool,
    pub blend_light: bool,
    pub fog_light: bool,
    pub cubic_light: bool,
    /// Light falloff map expression and whether it is a camera cube map.
    pub light_falloff: Option<String>,
    pub light_falloff_cube_map: bool,
    pub coverage: Coverage,
    pub stages: Vec<Stage>,
}

impl Default for MaterialDef {
    fn default() -> Self {
        Self {
            description: String::new(),
            editor_image: None,
            material_flags: MaterialFlags::empty(),
            cull_type: CullType::default(),
            clamp_type: ClampType::default(),
            surface_flags: SurfaceFlags::empty(),
            surface_type: SurfaceType::default(),
            gui_decl_name: String::new(),
            sort: SORT_UNDEFINED,
            polygon_offset: 0.0,
            spectrum: 0,
            decal_info: DecalInfo::default(),
            has_decal_info: false,
            deform_type: DeformType::default(),
            deform_expressions: Vec::new(),
            deform_decl_name: String::new(),
            renderbump_arguments: String::new(),
            renderbump_flat_arguments: String::new(),
            ambient_light: false,
            blend_light: false,
            fog_light: false,
            cubic_light: false,
            light_falloff: None,
            light_falloff_cube_map: false,
            coverage: Coverage::default(),
            stages: Vec::new(),
        }
    }
}

impl MaterialDef {
    /// Re-apply the default sort for materials without an explicit one:
    /// translucent sorts after opaque geometry.
    pub fn reset_sort(&mut self) {
        self.material_flags.remove(MaterialFlags::HAS_SORT_DEFINED);
        self.sort = if self.material_flags.contains(MaterialFlags::TRANSLUCENT) {
            crate::keywords::SORT_MEDIUM
        } else {
            crate::keywords::SORT_OPAQUE
        };
    }
}

/// One material declaration: name, raw body, lazily parsed model and
/// the modified flag driving the save path.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    block: String,
    def: OnceCell<MaterialDef>,
    modified: bool,
}

impl Material {
    /// Wrap a declaration body as returned by the block tokenizer. The
    /// body is parsed on first access.
    pub fn from_block(name: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block: block.into(),
            def: OnceCell::new(),
            modified: false,
        }
    }

    /// A fresh in-memory material with an empty body.
    pub fn new_empty(name: impl Into<String>) -> Self {
        let mut material = Self::from_block(name, "");
        material.modified = true;
        material
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Renaming is registry-driven but still marks the material dirty.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.set_name(name);
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The declaration body: the original text while untouched, the
    /// regenerated text once modified.
    pub fn definition(&self) -> String {
        if self.modified {
            writer::generate_block(self.def())
        } else {
            self.block.clone()
        }
    }

    /// Commit pending edits: the regenerated body becomes the stored
    /// body and the modified flag clears. Called after a successful
    /// save.
    pub fn commit(&mut self) {
        if self.modified {
            self.block = writer::generate_block(self.def());
            self.modified = false;
        }
    }

    /// Shared read access to the parsed model.
    pub fn def(&self) -> &MaterialDef {
        self.def
            .get_or_init(|| parser::parse_material_def(&self.name, &self.block))
    }

    /// Exclusive access for edits; marks the material as modified.
    pub fn def_mut(&mut self) -> &mut MaterialDef {
        self.def();
        self.modified = true;
        self.def
            .get_mut()
            .expect("material definition was just initialised")
    }

    // Convenience accessors mirroring the declaration surface; the
    // full model is reachable through def()/def_mut().

    pub fn description(&self) -> &str {
        &self.def().description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.def_mut().description = description.into();
    }

    pub fn material_flags(&self) -> MaterialFlags {
        self.def().material_flags
    }

    pub fn set_material_flag(&mut self, flag: MaterialFlags) {
        self.def_mut().material_flags.insert(flag);
    }

    pub fn clear_material_flag(&mut self, flag: MaterialFlags) {
        self.def_mut().material_flags.remove(flag);
    }

    pub fn surface_type(&self) -> SurfaceType {
        self.def().surface_type
    }

    pub fn set_surface_type(&mut self, surface_type: SurfaceType) {
        self.def_mut().surface_type = surface_type;
    }

    pub fn cull_type(&self) -> CullType {
        self.def().cull_type
    }

    pub fn set_cull_type(&mut self, cull_type: CullType) {
        self.def_mut().cull_type = cull_type;
    }

    pub fn clamp_type(&self) -> ClampType {
        self.def().clamp_type
    }

    pub fn set_clamp_type(&mut self, clamp_type: ClampType) {
        self.def_mut().clamp_type = clamp_type;
    }

    pub fn polygon_offset(&self) -> f32 {
        self.def().polygon_offset
    }

    pub fn set_polygon_offset(&mut self, offset: f32) {
        let def = self.def_mut();
        def.material_flags.insert(MaterialFlags::POLYGON_OFFSET);
        def.polygon_offset = offset;
    }

    pub fn sort(&self) -> f32 {
        self.def().sort
    }

    pub fn set_sort(&mut self, sort: f32) {
        let def = self.def_mut();
        def.material_flags.insert(MaterialFlags::HAS_SORT_DEFINED);
        def.sort = sort;
    }

    pub fn reset_sort(&mut self) {
        self.def_mut().reset_sort();
    }

    pub fn spectrum(&self) -> i32 {
        self.def().spectrum
    }

    pub fn set_spectrum(&mut self, spectrum: i32) {
        self.def_mut().spectrum = spectrum;
    }

    pub fn set_decal_info(&mut self, info: DecalInfo) {
        let def = self.def_mut();
        def.has_decal_info = info != DecalInfo::default();
        def.decal_info = info;
    }

    pub fn is_ambient_light(&self) -> bool {
        self.def().ambient_light
    }

    pub fn set_is_ambient_light(&mut self, value: bool) {
        self.def_mut().ambient_light = value;
    }

    pub fn is_blend_light(&self) -> bool {
        self.def().blend_light
    }

    pub fn set_is_blend_light(&mut self, value: bool) {
        self.def_mut().blend_light = value;
    }

    pub fn is_fog_light(&self) -> bool {
        self.def().fog_light
    }

    pub fn set_is_fog_light(&mut self, value: bool) {
        self.def_mut().fog_light = value;
    }

    pub fn is_cubic_light(&self) -> bool {
        self.def().cubic_light
    }

    pub fn set_is_cubic_light(&mut self, value: bool) {
        self.def_mut().cubic_light = value;
    }

    pub fn set_light_falloff(&mut self, expression: impl Into<String>, cube_map: bool) {
        let expression = expression.into();
        let def = self.def_mut();
        def.light_falloff = (!expression.is_empty()).then_some(expression);
        def.light_falloff_cube_map = cube_map;
    }

    pub fn stages(&self) -> &[Stage] {
        &self.def().stages
    }

    pub fn stage_mut(&mut self, index: usize) -> Option<&mut Stage> {
        self.def_mut().stages.get_mut(index)
    }

    /// Append a stage of the given type with its default map; returns
    /// the new stage index.
    pub fn add_stage(&mut self, stage_type: StageType) -> usize {
        let stage = Stage {
            stage_type,
            map: Stage::default_map_for(stage_type),
            ..Stage::default()
        };
        let def = self.def_mut();
        def.stages.push(stage);
        def.stages.len() - 1
    }

    pub fn remove_stage(&mut self, index: usize) {
        let def = self.def_mut();
        if index < def.stages.len() {
            def.stages.remove(index);
        }
    }

    pub fn swap_stages(&mut self, first: usize, second: usize) {
        let def = self.def_mut();
        if first < def.stages.len() && second < def.stages.len() {
            def.stages.swap(first, second);
        }
    }

    /// Duplicate a stage to the end of the list; returns the new index.
    pub fn duplicate_stage(&mut self, index: usize) -> Option<usize> {
        let def = self.def_mut();
        let copy = def.stages.get(index)?.clone();
        def.stages.push(copy);
        Some(def.stages.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_flag_lifecycle() {
        let mut material = Material::from_block("textures/test", "\tdiffusemap _white\n");
        assert!(!material.is_modified());

        material.set_description("hello");
        assert!(material.is_modified());

        material.commit();
        assert!(!material.is_modified());
        assert!(material.definition().contains("description \"hello\""));
    }

    #[test]
    fn test_unmodified_definition_is_raw_text() {
        let raw = "\n\t// odd formatting preserved\n\tdiffusemap _white\n";
        let material = Material::from_block("textures/test", raw);
        assert_eq!(material.definition(), raw);
    }

    #[test]
    fn test_new_empty_is_modified() {
        let material = Material::new_empty("textures/new");
        assert!(material.is_modified());
        assert!(material.stages().is_empty());
    }

    #[test]
    fn test_stage_operations() {
        let mut material = Material::new_empty("textures/new");
        let diffuse = material.add_stage(StageType::Diffuse);
        let bump = material.add_stage(StageType::Bump);
        assert_eq!(material.stages()[diffuse].map.as_deref(), Some("_white"));
        assert_eq!(material.stages()[bump].map.as_deref(), Some("_flat"));

        material.swap_stages(diffuse, bump);
        assert_eq!(material.stages()[0].stage_type, StageType::Bump);

        let copy = material.duplicate_stage(0).unwrap();
        assert_eq!(material.stages()[copy].stage_type, StageType::Bump);

        material.remove_stage(0);
        assert_eq!(material.stages().len(), 2);
    }

    #[test]
    fn test_blend_func_resolution() {
        let stage = Stage {
            blend_strings: ("add".to_string(), String::new()),
            ..Stage::default()
        };
        assert_eq!(stage.blend_func(), (BlendFactor::One, BlendFactor::One));

        let stage = Stage {
            blend_strings: ("gl_dst_color".to_string(), "gl_zero".to_string()),
            ..Stage::default()
        };
        assert_eq!(
            stage.blend_func(),
            (BlendFactor::DstColour, BlendFactor::Zero)
        );

        let stage = Stage {
            stage_type: StageType::Diffuse,
            ..Stage::default()
        };
        assert_eq!(stage.blend_func(), (BlendFactor::One, BlendFactor::Zero));
    }
}
