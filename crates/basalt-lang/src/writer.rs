//! Material source generator — the inverse of the template parser.
//!
//! Regenerates a declaration body from the model, collapsing stages to
//! their shortest faithful textual form: interaction stages with no
//! extra properties become `diffusemap x` one-liners, matching colour
//! channels fold back into `rgba`/`rgb`/`colored`, and named blend
//! shortcuts are re-emitted as parsed.

use crate::expr::Expression;
use crate::keywords;
use crate::material::{
    ClampType, ColourComponent, MapType, MaterialDef, MaterialFlags, Stage, StageFlags,
    StageType, SurfaceFlags, TexGenType, TransformType, VertexColourMode,
};

/// Comment written in front of declarations appended to a file.
pub const GENERATION_COMMENT: &str = "// Declaration generated by the Basalt material editor\n";

struct BlockWriter {
    output: String,
}

impl BlockWriter {
    fn new() -> Self {
        // The body starts on the line after the opening brace
        Self {
            output: String::from("\n"),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.output.push('\t');
        self.output.push_str(text.as_ref());
        self.output.push('\n');
    }

    fn stage_line(&mut self, text: impl AsRef<str>) {
        self.output.push_str("\t\t");
        self.output.push_str(text.as_ref());
        self.output.push('\n');
    }
}

/// Regenerate the declaration body for a material model. The result is
/// everything between the surrounding braces.
pub fn generate_block(def: &MaterialDef) -> String {
    let mut out = BlockWriter::new();

    if !def.description.is_empty() {
        // Double quotes cannot be escaped in a declaration
        out.line(format!(
            "description \"{}\"",
            def.description.replace('"', "'")
        ));
    }

    if let Some(editor_image) = &def.editor_image {
        out.line(format!("qer_editorimage {}", editor_image));
    }

    if let Some(keyword) = keywords::keyword_for_surface_type(def.surface_type) {
        out.line(keyword);
    }

    for (keyword, flag) in keywords::MATERIAL_FLAG_KEYWORDS {
        if def.material_flags.contains(*flag) {
            out.line(keyword);
        }
    }

    if def.material_flags.contains(MaterialFlags::POLYGON_OFFSET) {
        out.line(format!("polygonOffset {}", format_float(def.polygon_offset)));
    }

    if let Some(keyword) = keywords::keyword_for_clamp_type(def.clamp_type) {
        if def.clamp_type != ClampType::Repeat {
            out.line(keyword);
        }
    }

    if let Some(keyword) = keywords::keyword_for_cull_type(def.cull_type) {
        out.line(keyword);
    }

    if def.surface_flags.contains(SurfaceFlags::GUI_SURF) {
        let argument = if def.surface_flags.contains(SurfaceFlags::ENTITY_GUI) {
            "entity"
        } else if def.surface_flags.contains(SurfaceFlags::ENTITY_GUI2) {
            "entity2"
        } else if def.surface_flags.contains(SurfaceFlags::ENTITY_GUI3) {
            "entity3"
        } else {
            &def.gui_decl_name
        };
        out.line(format!("guisurf {}", argument));
    }

    for (keyword, flag) in keywords::SURFACE_FLAG_KEYWORDS {
        if def.surface_flags.contains(*flag) {
            out.line(keyword);
        }
    }

    if def.material_flags.contains(MaterialFlags::HAS_SORT_DEFINED) {
        match keywords::keyword_for_sort_value(def.sort) {
            Some(keyword) => out.line(format!("sort {}", keyword)),
            None => out.line(format!("sort {}", format_float(def.sort))),
        }
    }

    if def.spectrum != 0 {
        out.line(format!("spectrum {}", def.spectrum));
    }

    write_deform(&mut out, def);

    if def.has_decal_info {
        let info = &def.decal_info;
        out.line(format!(
            "decalinfo {} {} ( {} ) ( {} )",
            format_float(info.stay_ms as f32 / 1000.0),
            format_float(info.fade_ms as f32 / 1000.0),
            format_colour(&info.start_colour),
            format_colour(&info.end_colour),
        ));
    }

    if !def.renderbump_arguments.is_empty() {
        out.line(format!("renderbump {}", def.renderbump_arguments));
    }

    if !def.renderbump_flat_arguments.is_empty() {
        out.line(format!("renderbumpflat {}", def.renderbump_flat_arguments));
    }

    // ambient + cubic collapse into the combined keyword
    if def.ambient_light && def.cubic_light {
        out.line("ambientCubicLight");
    } else if def.ambient_light {
        out.line("ambientLight");
    } else if def.cubic_light {
        out.line("cubicLight");
    }
    if def.blend_light {
        out.line("blendLight");
    }
    if def.fog_light {
        out.line("fogLight");
    }

    if let Some(light_falloff) = &def.light_falloff {
        if def.light_falloff_cube_map {
            out.line(format!("lightFalloffCubeMap {}", light_falloff));
        } else {
            out.line(format!("lightFalloffImage {}", light_falloff));
        }
    }

    for stage in &def.stages {
        write_stage(&mut out, stage);
    }

    out.output
}

fn write_deform(out: &mut BlockWriter, def: &MaterialDef) {
    let Some(keyword) = keywords::keyword_for_deform(def.deform_type) else {
        return;
    };

    let mut line = format!("deform {}", keyword);

    if !def.deform_decl_name.is_empty() {
        line.push(' ');
        line.push_str(&def.deform_decl_name);
    }

    for expression in &def.deform_expressions {
        line.push(' ');
        line.push_str(&argument_form(expression));
    }

    out.line(line);
}

/// Whitespace-separated expression arguments have to stay re-parseable
/// as single terms, so multi-token expressions get parenthesised.
fn argument_form(expression: &Expression) -> String {
    let text = expression.to_source_string();
    if text.contains(' ') && !text.starts_with('(') {
        format!("({})", text)
    } else {
        text
    }
}

/// An interaction stage collapses to `diffusemap x` when nothing but
/// the map is set.
fn stage_is_shortcut(stage: &Stage) -> bool {
    matches!(
        stage.stage_type,
        StageType::Diffuse | StageType::Bump | StageType::Specular
    ) && stage.map.is_some()
        && stage.map_type == MapType::Map
        && stage.clamp.is_none()
        && stage.texgen == TexGenType::Normal
        && stage.transforms.is_empty()
        && stage.colour.iter().all(Option::is_none)
        && !stage.colored
        && stage.vertex_colour_mode == VertexColourMode::None
        && stage.condition.is_none()
        && stage.alpha_test.is_none()
        && stage.flags.is_empty()
        && stage.private_polygon_offset == 0.0
        && stage.vertex_program.is_empty()
        && stage.fragment_program.is_empty()
        && stage.vertex_parms.is_empty()
        && stage.fragment_maps.is_empty()
        && stage.render_map_size.is_none()
}

fn shortcut_keyword(stage_type: StageType) -> &'static str {
    match stage_type {
        StageType::Diffuse => "diffusemap",
        StageType::Bump => "bumpmap",
        StageType::Specular => "specularmap",
        StageType::Blend => "blend",
    }
}

fn write_stage(out: &mut BlockWriter, stage: &Stage) {
    if stage_is_shortcut(stage) {
        if let Some(map) = &stage.map {
            out.line(format!("{} {}", shortcut_keyword(stage.stage_type), map));
        }
        return;
    }

    out.line("{");

    match stage.stage_type {
        StageType::Diffuse | StageType::Bump | StageType::Specular => {
            out.stage_line(format!("blend {}", shortcut_keyword(stage.stage_type)));
        }
        StageType::Blend => {
            let (src, dst) = &stage.blend_strings;
            if !src.is_empty() {
                if dst.is_empty() {
                    out.stage_line(format!("blend {}", src));
                } else {
                    out.stage_line(format!("blend {}, {}", src, dst));
                }
            }
        }
    }

    write_map_line(out, stage);

    if stage.texgen != TexGenType::Normal && stage.map_type != MapType::MirrorRenderMap {
        let keyword = keywords::keyword_for_texgen(stage.texgen).unwrap_or("normal");
        let mut line = format!("texgen {}", keyword);
        for expression in &stage.texgen_expressions {
            line.push(' ');
            line.push_str(&argument_form(expression));
        }
        out.stage_line(line);
    }

    for transform in &stage.transforms {
        let keyword = match transform.kind {
            TransformType::Translate => "translate",
            TransformType::Scale => "scale",
            TransformType::CenterScale => "centerScale",
            TransformType::Shear => "shear",
            TransformType::Rotate => "rotate",
        };
        let expressions: Vec<String> = transform
            .expressions
            .iter()
            .map(Expression::to_source_string)
            .collect();
        out.stage_line(format!("{} {}", keyword, expressions.join(", ")));
    }

    write_colour_lines(out, stage);

    match stage.vertex_colour_mode {
        VertexColourMode::Multiply => out.stage_line("vertexColor"),
        VertexColourMode::InverseMultiply => out.stage_line("inverseVertexColor"),
        VertexColourMode::None => {}
    }

    if let Some(condition) = &stage.condition {
        out.stage_line(format!("if {}", condition.to_source_string()));
    }

    if let Some(alpha_test) = &stage.alpha_test {
        out.stage_line(format!("alphaTest {}", alpha_test.to_source_string()));
    }

    if stage.private_polygon_offset != 0.0 {
        out.stage_line(format!(
            "privatePolygonOffset {}",
            format_float(stage.private_polygon_offset)
        ));
    }

    if let Some(clamp) = stage.clamp {
        match keywords::keyword_for_clamp_type(clamp) {
            Some(keyword) => out.stage_line(keyword),
            None => {}
        }
    }

    write_stage_flags(out, stage);

    if !stage.vertex_program.is_empty() {
        out.stage_line(format!("vertexProgram {}", stage.vertex_program));
    }
    if !stage.fragment_program.is_empty() {
        out.stage_line(format!("fragmentProgram {}", stage.fragment_program));
    }

    for parm in &stage.vertex_parms {
        let expressions: Vec<String> = parm
            .expressions
            .iter()
            .map(Expression::to_source_string)
            .collect();
        out.stage_line(format!("vertexParm {} {}", parm.index, expressions.join(", ")));
    }

    for map in &stage.fragment_maps {
        let mut line = format!("fragmentMap {}", map.index);
        for option in &map.options {
            line.push(' ');
            line.push_str(option);
        }
        line.push(' ');
        line.push_str(&map.map);
        out.stage_line(line);
    }

    out.line("}");
}

fn write_map_line(out: &mut BlockWriter, stage: &Stage) {
    match stage.map_type {
        MapType::Map => {
            if let Some(map) = &stage.map {
                out.stage_line(format!("map {}", map));
            }
        }
        MapType::CubeMap => {
            if let Some(map) = &stage.map {
                out.stage_line(format!("cubeMap {}", map));
            }
        }
        MapType::CameraCubeMap => {
            if let Some(map) = &stage.map {
                out.stage_line(format!("cameraCubeMap {}", map));
            }
        }
        MapType::VideoMap { looping } => {
            if let Some(map) = &stage.map {
                if looping {
                    out.stage_line(format!("videoMap loop {}", map));
                } else {
                    out.stage_line(format!("videoMap {}", map));
                }
            }
        }
        MapType::SoundMap { waveform } => {
            if waveform {
                out.stage_line("soundMap waveform");
            } else {
                out.stage_line("soundMap");
            }
        }
        MapType::RemoteRenderMap => match stage.render_map_size {
            Some((width, height)) => {
                out.stage_line(format!("remoteRenderMap {} {}", width, height))
            }
            None => out.stage_line("remoteRenderMap"),
        },
        MapType::MirrorRenderMap => match stage.render_map_size {
            Some((width, height)) => {
                out.stage_line(format!("mirrorRenderMap {} {}", width, height))
            }
            None => out.stage_line("mirrorRenderMap"),
        },
    }
}

/// Collapse the four channel expressions back into the shortest
/// shortcut that reproduces them.
fn write_colour_lines(out: &mut BlockWriter, stage: &Stage) {
    if stage.colored {
        out.stage_line("colored");
        return;
    }

    let source = |component: ColourComponent| -> Option<String> {
        stage.colour[component as usize]
            .as_ref()
            .map(Expression::to_source_string)
    };

    let red = source(ColourComponent::Red);
    let green = source(ColourComponent::Green);
    let blue = source(ColourComponent::Blue);
    let alpha = source(ColourComponent::Alpha);

    let rgb_equal = red.is_some() && red == green && green == blue;

    if rgb_equal && red == alpha {
        out.stage_line(format!("rgba {}", red.unwrap_or_default()));
        return;
    }

    if rgb_equal {
        out.stage_line(format!("rgb {}", red.unwrap_or_default()));
        if let Some(alpha) = alpha {
            out.stage_line(format!("alpha {}", alpha));
        }
        return;
    }

    if let (Some(red), Some(green), Some(blue), Some(alpha)) = (&red, &green, &blue, &alpha) {
        out.stage_line(format!("color {}, {}, {}, {}", red, green, blue, alpha));
        return;
    }

    for (component, keyword) in [
        (red, "red"),
        (green, "green"),
        (blue, "blue"),
        (alpha, "alpha"),
    ] {
        if let Some(expression) = component {
            out.stage_line(format!("{} {}", keyword, expression));
        }
    }
}

fn write_stage_flags(out: &mut BlockWriter, stage: &Stage) {
    let mask_colour =
        StageFlags::MASK_RED | StageFlags::MASK_GREEN | StageFlags::MASK_BLUE;
    let collapse_masks = stage.flags.contains(mask_colour);

    if collapse_masks {
        out.stage_line("maskcolor");
    }

    let mut written = StageFlags::empty();
    for (keyword, flag) in keywords::STAGE_FLAG_KEYWORDS {
        if collapse_masks && mask_colour.contains(*flag) {
            continue;
        }
        if stage.flags.contains(*flag) && !written.contains(*flag) {
            out.stage_line(keyword);
            written.insert(*flag);
        }
    }
}

fn format_float(value: f32) -> String {
    format!("{}", value)
}

fn format_colour(colour: &[f32; 4]) -> String {
    colour
        .iter()
        .map(|channel| format_float(*channel))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_material_def;

    fn round_trip(block: &str) -> String {
        generate_block(&parse_material_def("textures/test", block))
    }

    #[test]
    fn test_empty_material() {
        let block = round_trip("");
        assert_eq!(block.trim(), "");
    }

    #[test]
    fn test_diffuse_shortcut_collapses() {
        let block = round_trip("{\n\tblend diffusemap\n\tmap _white\n}\n");
        assert_eq!(block, "\n\tdiffusemap _white\n");
    }

    #[test]
    fn test_extra_property_forces_verbose_form() {
        let block = round_trip("{\n\tblend diffusemap\n\tmap _white\n\tzeroclamp\n}\n");
        assert!(block.contains("blend diffusemap"));
        assert!(block.contains("\t\tmap _white\n"));
        assert!(block.contains("\t\tzeroclamp\n"));
        assert!(!block.contains("diffusemap _white\n\t"));
    }

    #[test]
    fn test_description_quoting() {
        let block = round_trip("description \"some \"nested\" words\"\n");
        // parsed up to the inner quote; requoted with the outer pair
        assert!(block.starts_with("\n\tdescription \""));
    }

    #[test]
    fn test_blend_strings_preserved() {
        let block = round_trip("{\n\tblend add\n\tmap a\n}\n");
        assert!(block.contains("blend add\n"));

        let block = round_trip("{\n\tblend gl_dst_color, gl_zero\n\tmap a\n}\n");
        assert!(block.contains("blend gl_dst_color, gl_zero\n"));
    }

    #[test]
    fn test_colour_collapse() {
        let block = round_trip("{\n\tmap a\n\trgba 0.5\n}\n");
        assert!(block.contains("rgba 0.5\n"));

        let block = round_trip("{\n\tmap a\n\trgb time\n\talpha 0.3\n}\n");
        assert!(block.contains("rgb time\n"));
        assert!(block.contains("alpha 0.3\n"));

        let block = round_trip("{\n\tmap a\n\tcolored\n}\n");
        assert!(block.contains("colored\n"));
        assert!(!block.contains("parm0"));

        let block = round_trip("{\n\tmap a\n\tcolor 1, 0.5, time, parm3\n}\n");
        assert!(block.contains("color 1, 0.5, time, parm3\n"));

        let block = round_trip("{\n\tmap a\n\tred 0.1\n\tblue 0.2\n}\n");
        assert!(block.contains("red 0.1\n"));
        assert!(block.contains("blue 0.2\n"));
    }

    #[test]
    fn test_sort_keyword_preferred() {
        let block = round_trip("sort decal\n");
        assert!(block.contains("sort decal\n"));

        let block = round_trip("sort -1.2\n");
        assert!(block.contains("sort -1.2\n"));
    }

    #[test]
    fn test_light_flags() {
        let block = round_trip("ambientlight\ncubiclight\n");
        assert!(block.contains("ambientCubicLight\n"));
        assert!(!block.contains("\tambientLight\n"));

        let block = round_trip("foglight\n");
        assert!(block.contains("fogLight\n"));
    }

    #[test]
    fn test_light_falloff() {
        let block = round_trip("lightfalloffimage makeintensity(lights/standard)\n");
        assert!(block.contains("lightFalloffImage makeintensity(lights/standard)\n"));

        let block = round_trip("lightfalloffcubemap env/standard\n");
        assert!(block.contains("lightFalloffCubeMap env/standard\n"));
    }

    #[test]
    fn test_decal_info_line() {
        let block = round_trip("decalinfo 14.3 1.5 ( 0.9 0.8 0.7 0.6 ) ( 0.5 0.5 0.4 0.3 )\n");
        assert!(block.contains("decalinfo 14.3 1.5 ( 0.9 0.8 0.7 0.6 ) ( 0.5 0.5 0.4 0.3 )\n"));
    }

    #[test]
    fn test_deform_lines() {
        let block = round_trip("deform flare 1.5\n");
        assert!(block.contains("deform flare 1.5\n"));

        let block = round_trip("deform move (1.7 + time + 4.0 - global3)\n");
        assert!(block.contains("deform move (1.7 + time + 4 - global3)\n"));

        let block = round_trip("deform particle2 testparticle\n");
        assert!(block.contains("deform particle2 testparticle\n"));
    }

    #[test]
    fn test_transforms_in_order() {
        let block =
            round_trip("{\n\tmap a\n\tscale 2, 2\n\trotate time\n\ttranslate 0.1, 0.2\n}\n");
        let scale = block.find("scale 2, 2").unwrap();
        let rotate = block.find("rotate time").unwrap();
        let translate = block.find("translate 0.1, 0.2").unwrap();
        assert!(scale < rotate && rotate < translate);
    }

    #[test]
    fn test_stage_extras() {
        let block = round_trip(
            "{\n\tmap a\n\tif parm5\n\talphatest 0.5\n\tprivatepolygonoffset -2\n\tnopicmip\n\tmaskred\n\tmaskgreen\n\tmaskblue\n}\n",
        );
        assert!(block.contains("if parm5\n"));
        assert!(block.contains("alphaTest 0.5\n"));
        assert!(block.contains("privatePolygonOffset -2\n"));
        assert!(block.contains("nopicmip\n"));
        assert!(block.contains("maskcolor\n"));
        assert!(!block.contains("maskred"));
    }

    #[test]
    fn test_render_map_lines() {
        let block = round_trip("{\n\tremoterendermap 256 128\n}\n");
        assert!(block.contains("remoteRenderMap 256 128\n"));

        let block = round_trip("{\n\tmirrorrendermap\n}\n");
        assert!(block.contains("mirrorRenderMap\n"));
        // texgen screen is implied by the mirror render map
        assert!(!block.contains("texgen"));
    }

    #[test]
    fn test_programs_and_parms() {
        let block = round_trip(
            "{\n\tmap a\n\tvertexprogram heat.vfp\n\tfragmentprogram heat.vfp\n\tvertexparm 0 time, 0.5\n\tfragmentmap 1 cubeMap env/sky\n}\n",
        );
        assert!(block.contains("vertexProgram heat.vfp\n"));
        assert!(block.contains("fragmentProgram heat.vfp\n"));
        assert!(block.contains("vertexParm 0 time, 0.5\n"));
        assert!(block.contains("fragmentMap 1 cubeMap env/sky\n"));
    }

    #[test]
    fn test_regeneration_is_stable() {
        // generate(parse(generate(parse(x)))) == generate(parse(x))
        for block in [
            "diffusemap a\nbumpmap b\n",
            "translucent\nsort 3\n{\n\tblend add\n\tmap x\n\tscroll time, 0.5\n\trgba 0.3\n}\n",
            "decal_macro\ndiffusemap gfx/decal\n",
            "deform turbulent sintable time*2.0 (parm11 - 4.0) -1.0\n",
        ] {
            let once = round_trip(block);
            let twice = round_trip(&once);
            assert_eq!(once, twice, "regeneration not stable for {:?}", block);
        }
    }
}
