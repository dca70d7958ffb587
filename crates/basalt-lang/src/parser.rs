//! Material template parser.
//!
//! Consumes a tokenized declaration body and fills a `MaterialDef`.
//! This is a keyword scanner, not a recursive-descent parser: each
//! helper inspects one lowercased token and reports whether it consumed
//! it. Unknown keywords log a warning and parsing continues, so one bad
//! keyword never takes down the rest of the declaration.

use basalt_core::{BasaltError, BasaltResult};
use tracing::warn;

use crate::expr::Expression;
use crate::keywords;
use crate::material::{
    ClampType, ColourComponent, Coverage, CullType, DecalInfo, DeformType, FragmentMap,
    MapType, MaterialDef, MaterialFlags, Stage, StageFlags, StageType, SurfaceFlags, TexGenType,
    Transformation, TransformType, VertexColourMode, VertexParm, SORT_UNDEFINED,
};
use crate::material::BlendFactor;
use crate::tokens::Tokeniser;

const MAX_VERTEX_PARMS: usize = 4;
const MAX_FRAGMENT_MAPS: usize = 8;

/// Parse a declaration body into a material model. Never fails: a hard
/// parse error is logged and the state gathered so far is returned,
/// isolating the failure to this one declaration.
pub(crate) fn parse_material_def(name: &str, block: &str) -> MaterialDef {
    let mut def = MaterialDef::default();
    let mut tok = Tokeniser::new(block);

    if let Err(err) = parse_into(&mut def, &mut tok, name) {
        warn!("error parsing material '{}': {}", name, err);
    }

    if def.sort == SORT_UNDEFINED {
        def.reset_sort();
    }

    determine_coverage(&mut def);
    def
}

fn parse_into(def: &mut MaterialDef, tok: &mut Tokeniser, name: &str) -> BasaltResult<()> {
    let mut level = 1usize;
    let mut current = Stage::default();

    while level > 0 && tok.has_more() {
        let token = tok.next_token()?;

        match token.as_str() {
            "}" => {
                level -= 1;
                if level == 1 {
                    save_layer(def, &mut current);
                }
            }
            "{" => level += 1,
            _ => {
                let lower = token.to_lowercase();

                match level {
                    1 => {
                        if parse_shader_flags(def, tok, &lower)?
                            || parse_light_keywords(def, tok, &lower)?
                            || parse_blend_shortcuts(def, tok, &lower)?
                            || parse_surface_flags(def, tok, &lower)?
                            || parse_material_type(def, &lower)
                        {
                            continue;
                        }
                        warn!("material keyword not recognised: {}", token);
                    }
                    2 => {
                        if parse_condition(&mut current, tok, &lower, name)?
                            || parse_blend_type(&mut current, tok, &lower)?
                            || parse_blend_maps(&mut current, tok, &lower)?
                            || parse_stage_modifiers(def, &mut current, tok, &lower, name)?
                        {
                            continue;
                        }
                        warn!("stage keyword not recognised: {}", token);
                    }
                    _ => {} // nested blocks below stage level are skipped
                }
            }
        }
    }

    Ok(())
}

/// Move the accumulated stage into the material if it binds anything.
fn save_layer(def: &mut MaterialDef, current: &mut Stage) {
    if current.has_content() {
        def.stages.push(std::mem::take(current));
    } else {
        *current = Stage::default();
    }
}

fn parse_shader_flags(
    def: &mut MaterialDef,
    tok: &mut Tokeniser,
    token: &str,
) -> BasaltResult<bool> {
    if let Some(flag) = keywords::material_flag_for_keyword(token) {
        def.material_flags.insert(flag);
        match token {
            "translucent" => {
                def.material_flags.insert(MaterialFlags::NO_SHADOWS);
                def.coverage = Coverage::Translucent;
            }
            "forceopaque" | "mirror" => def.coverage = Coverage::Opaque,
            _ => {}
        }
        return Ok(true);
    }

    if let Some(cull) = keywords::cull_type_for_keyword(token) {
        def.cull_type = cull;
        return Ok(true);
    }

    match token {
        "decal_macro" => {
            def.material_flags |= MaterialFlags::TRANSLUCENT
                | MaterialFlags::NO_SHADOWS
                | MaterialFlags::HAS_SORT_DEFINED
                | MaterialFlags::POLYGON_OFFSET;
            def.sort = keywords::SORT_DECAL;
            def.polygon_offset = 1.0;
            def.surface_flags |= SurfaceFlags::DISCRETE | SurfaceFlags::NON_SOLID;
        }
        "twosided_decal_macro" => {
            def.material_flags |= MaterialFlags::TRANSLUCENT
                | MaterialFlags::NO_SHADOWS
                | MaterialFlags::NO_SELF_SHADOW
                | MaterialFlags::HAS_SORT_DEFINED
                | MaterialFlags::POLYGON_OFFSET;
            def.sort = keywords::SORT_DECAL;
            def.polygon_offset = 1.0;
            def.surface_flags |=
                SurfaceFlags::DISCRETE | SurfaceFlags::NO_IMPACT | SurfaceFlags::NON_SOLID;
            def.cull_type = CullType::None;
            def.coverage = Coverage::Translucent;
        }
        "particle_macro" => {
            def.material_flags |= MaterialFlags::NO_SHADOWS | MaterialFlags::NO_SELF_SHADOW;
            def.surface_flags |=
                SurfaceFlags::DISCRETE | SurfaceFlags::NO_IMPACT | SurfaceFlags::NON_SOLID;
            def.coverage = Coverage::Translucent;
        }
        "glass_macro" => {
            def.cull_type = CullType::None;
            def.material_flags |= MaterialFlags::NO_SHADOWS | MaterialFlags::NO_SELF_SHADOW;
            def.coverage = Coverage::Translucent;
        }
        "description" => def.description = tok.next_token()?,
        "polygonoffset" => {
            def.material_flags.insert(MaterialFlags::POLYGON_OFFSET);
            // The value argument is optional
            def.polygon_offset = match tok.peek().and_then(|t| t.parse::<f32>().ok()) {
                Some(value) => {
                    tok.skip(1);
                    value
                }
                None => 1.0,
            };
        }
        "clamp" => def.clamp_type = ClampType::NoRepeat,
        "zeroclamp" => def.clamp_type = ClampType::ZeroClamp,
        "alphazeroclamp" => def.clamp_type = ClampType::AlphaZeroClamp,
        "sort" => {
            def.material_flags.insert(MaterialFlags::HAS_SORT_DEFINED);
            let value = tok.next_token()?.to_lowercase();
            def.sort = match keywords::sort_value_for_keyword(&value) {
                Some(sort) => sort,
                // No predefined keyword, try the numeric value
                None => value.trim_matches('"').parse().unwrap_or(SORT_UNDEFINED),
            };
        }
        "decalinfo" => {
            def.has_decal_info = true;
            def.decal_info = parse_decal_info(tok)?;
        }
        "deform" => parse_deform(def, tok)?,
        "renderbump" => def.renderbump_arguments = parse_renderbump(tok)?,
        "renderbumpflat" => def.renderbump_flat_arguments = parse_renderbump_flat(tok)?,
        _ => return Ok(false),
    }

    Ok(true)
}

fn parse_decal_info(tok: &mut Tokeniser) -> BasaltResult<DecalInfo> {
    let line = tok.line();
    let seconds = |token: String| -> BasaltResult<i32> {
        token
            .parse::<f32>()
            .map(|s| (s * 1000.0) as i32)
            .map_err(|_| BasaltError::parse(format!("expected decal time, got '{}'", token), line))
    };

    let mut info = DecalInfo {
        stay_ms: seconds(tok.next_token()?)?,
        fade_ms: seconds(tok.next_token()?)?,
        ..DecalInfo::default()
    };

    for colour in [&mut info.start_colour, &mut info.end_colour] {
        tok.assert_next("(")?;
        for channel in colour.iter_mut() {
            let token = tok.next_token()?;
            *channel = token.parse().map_err(|_| {
                BasaltError::parse(format!("expected decal colour value, got '{}'", token), line)
            })?;
        }
        tok.assert_next(")")?;
    }

    Ok(info)
}

fn parse_deform(def: &mut MaterialDef, tok: &mut Tokeniser) -> BasaltResult<()> {
    let kind = tok.next_token()?.to_lowercase();
    let Some(deform) = keywords::deform_for_keyword(&kind) else {
        warn!("unknown deform type: {}", kind);
        return Ok(());
    };

    def.deform_type = deform;

    match deform {
        DeformType::Flare | DeformType::Expand | DeformType::Move => {
            def.deform_expressions.push(parse_single_term(tok)?);
        }
        DeformType::Turbulent => {
            def.deform_decl_name = tok.next_token()?;
            for _ in 0..3 {
                // range, time offset, domain
                def.deform_expressions.push(parse_single_term(tok)?);
            }
        }
        DeformType::Particle | DeformType::Particle2 => {
            def.deform_decl_name = tok.next_token()?;
        }
        _ => {}
    }

    Ok(())
}

/// A single expression argument: either one token or one parenthesised
/// group. Keeps whitespace-separated argument lists apart, where a full
/// expression parse would swallow a following `-`.
fn parse_single_term(tok: &mut Tokeniser) -> BasaltResult<Expression> {
    let first = tok.next_token()?;

    if first != "(" {
        return Expression::parse(&first);
    }

    let mut text = String::from("(");
    let mut level = 1usize;

    while level > 0 {
        let token = tok.next_token()?;
        match token.as_str() {
            "(" => level += 1,
            ")" => level -= 1,
            _ => {}
        }
        text.push(' ');
        text.push_str(&token);
    }

    Expression::parse(&text)
}

fn parse_renderbump(tok: &mut Tokeniser) -> BasaltResult<String> {
    let mut arguments = String::new();
    let mut push = |part: String| {
        if !arguments.is_empty() {
            arguments.push(' ');
        }
        arguments.push_str(&part);
    };

    let mut next = tok.next_token()?;

    while next.starts_with('-') {
        match next.to_lowercase().as_str() {
            "-size" => {
                let width = tok.next_token()?;
                let height = tok.next_token()?;
                push(format!("-size {} {}", width, height));
            }
            "-aa" => push(format!("-aa {}", tok.next_token()?)),
            "-trace" => push(format!("-trace {}", tok.next_token()?)),
            other => warn!("unknown renderbump option: {}", other),
        }
        next = tok.next_token()?;
    }

    // The normal map token is already loaded, the high poly model follows
    push(format!("{} {}", next, tok.next_token()?));

    Ok(arguments)
}

fn parse_renderbump_flat(tok: &mut Tokeniser) -> BasaltResult<String> {
    let mut next = tok.next_token()?;
    let mut arguments = String::new();

    if next.to_lowercase() == "-size" {
        let width = tok.next_token()?;
        let height = tok.next_token()?;
        arguments = format!("-size {} {} ", width, height);
        next = tok.next_token()?;
    }

    arguments.push_str(&next);
    Ok(arguments)
}

fn parse_light_keywords(
    def: &mut MaterialDef,
    tok: &mut Tokeniser,
    token: &str,
) -> BasaltResult<bool> {
    match token {
        "ambientlight" => def.ambient_light = true,
        "blendlight" => def.blend_light = true,
        "foglight" => def.fog_light = true,
        "cubiclight" => def.cubic_light = true,
        "ambientcubiclight" => {
            def.ambient_light = true;
            def.cubic_light = true;
        }
        "lightfalloffimage" if !def.fog_light => {
            def.light_falloff_cube_map = false;
            def.light_falloff = Some(parse_map_expression(tok)?);
        }
        "lightfalloffcubemap" => {
            def.light_falloff_cube_map = true;
            def.light_falloff = Some(parse_map_expression(tok)?);
        }
        "spectrum" => {
            let value = tok.next_token()?;
            match value.parse::<i32>() {
                Ok(spectrum) => def.spectrum = spectrum,
                Err(err) => warn!("expected integer spectrum value, found {}: {}", value, err),
            }
        }
        _ => return Ok(false),
    }

    Ok(true)
}

/// Single-line stages (`diffusemap x/y/z`) and the editor image.
fn parse_blend_shortcuts(
    def: &mut MaterialDef,
    tok: &mut Tokeniser,
    token: &str,
) -> BasaltResult<bool> {
    let stage_type = match token {
        "qer_editorimage" => {
            def.editor_image = Some(parse_map_expression(tok)?);
            return Ok(true);
        }
        "diffusemap" => StageType::Diffuse,
        "bumpmap" => StageType::Bump,
        "specularmap" => StageType::Specular,
        _ => return Ok(false),
    };

    def.stages.push(Stage {
        stage_type,
        map: Some(parse_map_expression(tok)?),
        ..Stage::default()
    });

    Ok(true)
}

fn parse_surface_flags(
    def: &mut MaterialDef,
    tok: &mut Tokeniser,
    token: &str,
) -> BasaltResult<bool> {
    if let Some(flag) = keywords::surface_flag_for_keyword(token) {
        def.surface_flags.insert(flag);
        return Ok(true);
    }

    if token == "guisurf" {
        // "guisurf blah.gui" or "guisurf entity[2|3]"
        def.surface_flags.insert(SurfaceFlags::GUI_SURF);
        let argument = tok.next_token()?;

        match argument.to_lowercase().as_str() {
            "entity" => def.surface_flags.insert(SurfaceFlags::ENTITY_GUI),
            "entity2" => def.surface_flags.insert(SurfaceFlags::ENTITY_GUI2),
            "entity3" => def.surface_flags.insert(SurfaceFlags::ENTITY_GUI3),
            _ => def.gui_decl_name = argument,
        }

        return Ok(true);
    }

    Ok(false)
}

fn parse_material_type(def: &mut MaterialDef, token: &str) -> bool {
    match keywords::surface_type_for_keyword(token) {
        Some(surface_type) => {
            def.surface_type = surface_type;
            true
        }
        None => false,
    }
}

fn parse_condition(
    stage: &mut Stage,
    tok: &mut Tokeniser,
    token: &str,
    name: &str,
) -> BasaltResult<bool> {
    if token != "if" {
        return Ok(false);
    }

    match Expression::parse_from_tokens(tok) {
        Ok(condition) => stage.condition = Some(condition),
        Err(err) => warn!("could not parse condition in material '{}': {}", name, err),
    }

    Ok(true)
}

fn parse_blend_type(stage: &mut Stage, tok: &mut Tokeniser, token: &str) -> BasaltResult<bool> {
    if token != "blend" {
        return Ok(false);
    }

    let src = tok.next_token()?.to_lowercase();

    if let Some(stage_type) = match src.as_str() {
        "diffusemap" => Some(StageType::Diffuse),
        "bumpmap" => Some(StageType::Bump),
        "specularmap" => Some(StageType::Specular),
        _ => None,
    } {
        stage.stage_type = stage_type;
        return Ok(true);
    }

    if src.starts_with("gl_") {
        // An explicit GL blend mode pair
        tok.assert_next(",")?;
        let dst = tok.next_token()?.to_lowercase();
        stage.blend_strings = (src, dst);
    } else {
        stage.blend_strings = (src, String::new());
    }

    Ok(true)
}

/// Nested map expressions like `addnormals(a, heightmap(b, 4))` are
/// reassembled into one textual form.
fn parse_map_expression(tok: &mut Tokeniser) -> BasaltResult<String> {
    let mut text = tok.next_token()?;

    if tok.peek() == Some("(") {
        tok.next_token()?;
        text.push('(');
        loop {
            match tok.peek() {
                Some(")") => {
                    tok.next_token()?;
                    text.push(')');
                    break;
                }
                Some(",") => {
                    tok.next_token()?;
                    text.push_str(", ");
                }
                Some(_) => text.push_str(&parse_map_expression(tok)?),
                None => {
                    return Err(BasaltError::parse(
                        "unterminated map expression",
                        tok.line(),
                    ))
                }
            }
        }
    }

    Ok(text)
}

fn parse_blend_maps(stage: &mut Stage, tok: &mut Tokeniser, token: &str) -> BasaltResult<bool> {
    match token {
        "map" => {
            stage.map = Some(parse_map_expression(tok)?);
            // Keep the map type, "map" occurs in several scenarios
        }
        "cubemap" => {
            stage.map = Some(parse_map_expression(tok)?);
            stage.map_type = MapType::CubeMap;
        }
        "cameracubemap" => {
            stage.map = Some(tok.next_token()?);
            stage.map_type = MapType::CameraCubeMap;
        }
        "videomap" => {
            let looping = tok.peek().is_some_and(|t| t.eq_ignore_ascii_case("loop"));
            if looping {
                tok.skip(1);
            }
            stage.map = Some(tok.next_token()?);
            stage.map_type = MapType::VideoMap { looping };
        }
        "soundmap" => {
            let waveform = tok
                .peek()
                .is_some_and(|t| t.eq_ignore_ascii_case("waveform"));
            if waveform {
                tok.skip(1);
            }
            stage.map_type = MapType::SoundMap { waveform };
        }
        "remoterendermap" => {
            stage.map_type = MapType::RemoteRenderMap;
            parse_render_map_size(stage, tok, false);
        }
        "mirrorrendermap" => {
            stage.map_type = MapType::MirrorRenderMap;
            stage.texgen = TexGenType::Screen;
            parse_render_map_size(stage, tok, true);
        }
        "texgen" => {
            let kind = tok.next_token()?.to_lowercase();
            match keywords::texgen_for_keyword(&kind) {
                Some(texgen) => {
                    stage.texgen = texgen;
                    if texgen == TexGenType::WobbleSky {
                        for _ in 0..3 {
                            stage.texgen_expressions.push(parse_single_term(tok)?);
                        }
                    }
                }
                None => warn!("unknown texgen type: {}", kind),
            }
        }
        _ => return Ok(false),
    }

    Ok(true)
}

fn parse_render_map_size(stage: &mut Stage, tok: &mut Tokeniser, optional: bool) {
    let mut dimension = |label: &str| -> Option<i32> {
        match tok.peek().and_then(|t| t.parse::<i32>().ok()) {
            Some(value) => {
                tok.skip(1);
                Some(value)
            }
            None => {
                if !optional {
                    warn!("error parsing render map {}, expected two integers", label);
                }
                None
            }
        }
    };

    if let (Some(width), Some(height)) = (dimension("width"), dimension("height")) {
        stage.render_map_size = Some((width, height));
    }
}

fn parse_stage_modifiers(
    def: &mut MaterialDef,
    stage: &mut Stage,
    tok: &mut Tokeniser,
    token: &str,
    name: &str,
) -> BasaltResult<bool> {
    // Colour expression helper shared by the per-channel keywords
    let mut colour = |stage: &mut Stage, tok: &mut Tokeniser, components: &[ColourComponent]| {
        match Expression::parse_from_tokens(tok) {
            Ok(expr) => {
                for component in components {
                    stage.set_colour_component(*component, expr.clone());
                }
            }
            Err(err) => warn!(
                "could not parse {} expression in material '{}': {}",
                token, name, err
            ),
        }
    };

    if let Some(flag) = keywords::stage_flag_for_keyword(token) {
        stage.flags.insert(flag);
        return Ok(true);
    }

    if let Some(clamp) = keywords::clamp_type_for_keyword(token) {
        stage.clamp = Some(clamp);
        return Ok(true);
    }

    match token {
        "vertexcolor" => stage.vertex_colour_mode = VertexColourMode::Multiply,
        "inversevertexcolor" => stage.vertex_colour_mode = VertexColourMode::InverseMultiply,
        "red" => colour(stage, tok, &[ColourComponent::Red]),
        "green" => colour(stage, tok, &[ColourComponent::Green]),
        "blue" => colour(stage, tok, &[ColourComponent::Blue]),
        "alpha" => colour(stage, tok, &[ColourComponent::Alpha]),
        "rgb" => colour(
            stage,
            tok,
            &[
                ColourComponent::Red,
                ColourComponent::Green,
                ColourComponent::Blue,
            ],
        ),
        "rgba" => colour(
            stage,
            tok,
            &[
                ColourComponent::Red,
                ColourComponent::Green,
                ColourComponent::Blue,
                ColourComponent::Alpha,
            ],
        ),
        "color" => {
            // color <exp0>, <exp1>, <exp2>, <exp3>
            for (index, component) in [
                ColourComponent::Red,
                ColourComponent::Green,
                ColourComponent::Blue,
                ColourComponent::Alpha,
            ]
            .into_iter()
            .enumerate()
            {
                if index > 0 {
                    tok.assert_next(",")?;
                }
                match Expression::parse_from_tokens(tok) {
                    Ok(expr) => stage.set_colour_component(component, expr),
                    Err(err) => {
                        warn!("could not parse color expression in material '{}': {}", name, err)
                    }
                }
            }
        }
        "colored" => {
            stage.colored = true;
            for (index, component) in [
                ColourComponent::Red,
                ColourComponent::Green,
                ColourComponent::Blue,
                ColourComponent::Alpha,
            ]
            .into_iter()
            .enumerate()
            {
                stage.set_colour_component(component, Expression::parse(&format!("parm{}", index))?);
            }
        }
        "alphatest" => {
            match Expression::parse_from_tokens(tok) {
                Ok(expr) => stage.alpha_test = Some(expr),
                Err(err) => warn!(
                    "could not parse alphatest expression in material '{}': {}",
                    name, err
                ),
            }
            def.coverage = Coverage::Perforated;
        }
        "scale" | "centerscale" | "translate" | "scroll" | "shear" => {
            let kind = match token {
                "scale" => TransformType::Scale,
                "centerscale" => TransformType::CenterScale,
                "shear" => TransformType::Shear,
                // "scroll" is an alias for translate
                _ => TransformType::Translate,
            };

            let x = Expression::parse_from_tokens(tok);
            tok.assert_next(",")?;
            let y = Expression::parse_from_tokens(tok);

            match (x, y) {
                (Ok(x), Ok(y)) => stage.transforms.push(Transformation {
                    kind,
                    expressions: vec![x, y],
                }),
                _ => warn!("could not parse {} expression in material '{}'", token, name),
            }
        }
        "rotate" => match Expression::parse_from_tokens(tok) {
            Ok(expr) => stage.transforms.push(Transformation {
                kind: TransformType::Rotate,
                expressions: vec![expr],
            }),
            Err(err) => warn!(
                "could not parse rotate expression in material '{}': {}",
                name, err
            ),
        },
        "maskcolor" => {
            stage.flags |= StageFlags::MASK_RED | StageFlags::MASK_GREEN | StageFlags::MASK_BLUE;
        }
        "fragmentprogram" => stage.fragment_program = tok.next_token()?,
        "vertexprogram" => stage.vertex_program = tok.next_token()?,
        "program" => {
            let program = tok.next_token()?;
            stage.fragment_program = program.clone();
            stage.vertex_program = program;
        }
        "vertexparm" => {
            // vertexParm <parmNum> <parm1> [,<parm2>] [,<parm3>] [,<parm4>]
            let line = tok.line();
            let index = tok.next_token()?.parse::<usize>().map_err(|_| {
                BasaltError::parse("expected vertex parm index", line)
            })?;

            if index >= MAX_VERTEX_PARMS {
                return Err(BasaltError::parse(
                    format!(
                        "a material stage can have {} vertex parameters at most",
                        MAX_VERTEX_PARMS
                    ),
                    line,
                ));
            }

            let mut expressions = vec![Expression::parse_from_tokens(tok)?];
            while expressions.len() < 4 && tok.peek() == Some(",") {
                tok.skip(1);
                expressions.push(Expression::parse_from_tokens(tok)?);
            }

            stage.vertex_parms.push(VertexParm { index, expressions });
        }
        "fragmentmap" => {
            // fragmentMap <index> [options] <map>
            let line = tok.line();
            let index = tok.next_token()?.parse::<usize>().map_err(|_| {
                BasaltError::parse("expected fragment map index", line)
            })?;

            if index >= MAX_FRAGMENT_MAPS {
                return Err(BasaltError::parse(
                    format!(
                        "a material stage can have {} fragment maps at most",
                        MAX_FRAGMENT_MAPS
                    ),
                    line,
                ));
            }

            let mut options = Vec::new();
            while tok
                .peek()
                .is_some_and(|t| keywords::FRAGMENT_MAP_OPTIONS.contains(&t.to_lowercase().as_str()))
            {
                options.push(tok.next_token()?);
            }

            stage.fragment_maps.push(FragmentMap {
                index,
                options,
                map: parse_map_expression(tok)?,
            });
        }
        "privatepolygonoffset" => {
            let value = tok.next_token()?;
            stage.private_polygon_offset = value.parse().unwrap_or_else(|_| {
                warn!("expected float for privatePolygonOffset, got '{}'", value);
                0.0
            });
        }
        _ => return Ok(false),
    }

    Ok(true)
}

/// Port of the opaque/perforated/translucent decision: explicit
/// translucency wins, alpha-tested interaction stages are perforated,
/// blend-only materials inspect the first stage's blend function.
fn determine_coverage(def: &mut MaterialDef) {
    if def.material_flags.contains(MaterialFlags::TRANSLUCENT) {
        def.coverage = Coverage::Translucent;
        return;
    }

    if def.coverage == Coverage::Undetermined {
        let blend_stages = def
            .stages
            .iter()
            .filter(|stage| stage.stage_type == StageType::Blend)
            .count();

        if def.stages.is_empty() {
            // non-visible
            def.coverage = Coverage::Translucent;
        } else if def.stages.len() != blend_stages {
            // we have an interaction draw
            def.coverage = if def.stages.iter().any(Stage::has_alpha_test) {
                Coverage::Perforated
            } else {
                Coverage::Opaque
            };
        } else {
            let (src, dst) = def.stages[0].blend_func();

            let blends_with_destination = dst != BlendFactor::Zero
                || matches!(
                    src,
                    BlendFactor::DstColour
                        | BlendFactor::OneMinusDstColour
                        | BlendFactor::DstAlpha
                        | BlendFactor::OneMinusDstAlpha
                );

            def.coverage = if blends_with_destination {
                Coverage::Translucent
            } else {
                Coverage::Opaque
            };
        }
    }

    if def.coverage == Coverage::Translucent {
        def.material_flags.insert(MaterialFlags::NO_SHADOWS);
    } else {
        def.surface_flags.insert(SurfaceFlags::OPAQUE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(block: &str) -> MaterialDef {
        parse_material_def("textures/test", block)
    }

    #[test]
    fn test_diffusemap_shortcut() {
        let def = parse("\tdiffusemap textures/base/wall\n");
        assert_eq!(def.stages.len(), 1);
        assert_eq!(def.stages[0].stage_type, StageType::Diffuse);
        assert_eq!(def.stages[0].map.as_deref(), Some("textures/base/wall"));
    }

    #[test]
    fn test_interaction_shortcuts() {
        let def = parse("diffusemap a\nbumpmap b\nspecularmap c\n");
        assert_eq!(def.stages.len(), 3);
        assert_eq!(def.stages[1].stage_type, StageType::Bump);
        assert_eq!(def.stages[2].stage_type, StageType::Specular);
        assert_eq!(def.coverage, Coverage::Opaque);
    }

    #[test]
    fn test_description_and_flags() {
        let def = parse("description \"a test, with commas\"\nnoshadows\ntwosided\n");
        assert_eq!(def.description, "a test, with commas");
        assert!(def.material_flags.contains(MaterialFlags::NO_SHADOWS));
        assert_eq!(def.cull_type, CullType::None);
    }

    #[test]
    fn test_sort_keyword_and_number() {
        let def = parse("sort decal\n");
        assert_eq!(def.sort, keywords::SORT_DECAL);
        assert!(def.material_flags.contains(MaterialFlags::HAS_SORT_DEFINED));

        let def = parse("sort 12.5\n");
        assert_eq!(def.sort, 12.5);
    }

    #[test]
    fn test_default_sort_assignment() {
        // No sort specified: opaque materials default to opaque sort
        let def = parse("diffusemap a\n");
        assert_eq!(def.sort, keywords::SORT_OPAQUE);
        assert!(!def.material_flags.contains(MaterialFlags::HAS_SORT_DEFINED));

        // Translucent materials sort after opaque geometry
        let def = parse("translucent\ndiffusemap a\n");
        assert_eq!(def.sort, keywords::SORT_MEDIUM);
    }

    #[test]
    fn test_polygon_offset_optional_value() {
        let def = parse("polygonoffset\n");
        assert_eq!(def.polygon_offset, 1.0);

        let def = parse("polygonoffset 0.5\n");
        assert_eq!(def.polygon_offset, 0.5);
    }

    #[test]
    fn test_decal_info() {
        let def = parse("decalinfo 14.3 1.5 ( 0.9 0.8 0.7 0.6 ) ( 0.5 0.5 0.4 0.3 )\n");
        assert!(def.has_decal_info);
        assert_eq!(def.decal_info.stay_ms, 14300);
        assert_eq!(def.decal_info.fade_ms, 1500);
        assert_eq!(def.decal_info.start_colour, [0.9, 0.8, 0.7, 0.6]);
        assert_eq!(def.decal_info.end_colour, [0.5, 0.5, 0.4, 0.3]);
    }

    #[test]
    fn test_decal_macro() {
        let def = parse("decal_macro\n");
        assert!(def.material_flags.contains(MaterialFlags::TRANSLUCENT));
        assert!(def.material_flags.contains(MaterialFlags::POLYGON_OFFSET));
        assert_eq!(def.sort, keywords::SORT_DECAL);
        assert_eq!(def.polygon_offset, 1.0);
        assert!(def.surface_flags.contains(SurfaceFlags::DISCRETE));
    }

    #[test]
    fn test_deform_turbulent() {
        let def = parse("deform turbulent sintable time*2.0 (parm11 - 4.0) -1.0\n");
        assert_eq!(def.deform_type, DeformType::Turbulent);
        assert_eq!(def.deform_decl_name, "sintable");
        assert_eq!(def.deform_expressions.len(), 3);
        // whole-number floats print without the fraction
        assert_eq!(def.deform_expressions[0].to_source_string(), "time * 2");
        assert_eq!(def.deform_expressions[1].to_source_string(), "(parm11 - 4)");
    }

    #[test]
    fn test_deform_expand_parenthesised() {
        let def = parse("deform expand (0.1 * table[time * (0.3 + time)] - global3)\n");
        assert_eq!(def.deform_type, DeformType::Expand);
        assert_eq!(
            def.deform_expressions[0].to_source_string(),
            "(0.1 * table[time * (0.3 + time)] - global3)"
        );
    }

    #[test]
    fn test_renderbump() {
        let def = parse("renderbump -aa 2 -size 10 10 textures/output.tga models/hipoly\n");
        assert_eq!(
            def.renderbump_arguments,
            "-aa 2 -size 10 10 textures/output.tga models/hipoly"
        );

        let def = parse("renderbumpflat -size 200 100 models/hipoly\n");
        assert_eq!(def.renderbump_flat_arguments, "-size 200 100 models/hipoly");
    }

    #[test]
    fn test_guisurf() {
        let def = parse("guisurf guis/lvlmaps/genericmap.gui\n");
        assert!(def.surface_flags.contains(SurfaceFlags::GUI_SURF));
        assert_eq!(def.gui_decl_name, "guis/lvlmaps/genericmap.gui");

        let def = parse("guisurf entity2\n");
        assert!(def.surface_flags.contains(SurfaceFlags::ENTITY_GUI2));
        assert!(def.gui_decl_name.is_empty());
    }

    #[test]
    fn test_light_keywords() {
        let def = parse("ambientcubiclight\nspectrum 3\nlightfalloffimage makeintensity(lights/a)\n");
        assert!(def.ambient_light);
        assert!(def.cubic_light);
        assert_eq!(def.spectrum, 3);
        assert_eq!(
            def.light_falloff.as_deref(),
            Some("makeintensity(lights/a)")
        );
        assert!(!def.light_falloff_cube_map);
    }

    #[test]
    fn test_generic_stage() {
        let def = parse(
            "{\n\tblend add\n\tmap textures/fx/glow\n\tscroll time, 0.5\n\trotate 0.1\n\trgb 0.5 * parm0\n}\n",
        );
        assert_eq!(def.stages.len(), 1);
        let stage = &def.stages[0];
        assert_eq!(stage.stage_type, StageType::Blend);
        assert_eq!(stage.blend_strings.0, "add");
        assert_eq!(stage.map.as_deref(), Some("textures/fx/glow"));
        assert_eq!(stage.transforms.len(), 2);
        assert_eq!(stage.transforms[0].kind, TransformType::Translate);
        assert_eq!(stage.transforms[1].kind, TransformType::Rotate);
        assert_eq!(
            stage.colour[0].as_ref().unwrap().to_source_string(),
            "0.5 * parm0"
        );
        assert_eq!(
            stage.colour[2].as_ref().unwrap().to_source_string(),
            "0.5 * parm0"
        );
        assert!(stage.colour[3].is_none());
    }

    #[test]
    fn test_explicit_blend_pair() {
        let def = parse("{\n\tblend gl_one, gl_src_alpha\n\tmap a\n}\n");
        let stage = &def.stages[0];
        assert_eq!(
            stage.blend_strings,
            ("gl_one".to_string(), "gl_src_alpha".to_string())
        );
    }

    #[test]
    fn test_verbose_interaction_stage() {
        let def = parse("{\n\tblend diffusemap\n\tmap _white\n\tzeroclamp\n}\n");
        let stage = &def.stages[0];
        assert_eq!(stage.stage_type, StageType::Diffuse);
        assert_eq!(stage.clamp, Some(ClampType::ZeroClamp));
    }

    #[test]
    fn test_colored_shortcut() {
        let def = parse("{\n\tmap a\n\tcolored\n}\n");
        let stage = &def.stages[0];
        assert!(stage.colored);
        assert_eq!(stage.colour[1].as_ref().unwrap().to_source_string(), "parm1");
    }

    #[test]
    fn test_condition_and_alphatest() {
        let def = parse("{\n\tif parm5 == 1\n\tmap a\n\talphatest 0.5\n}\n");
        let stage = &def.stages[0];
        assert_eq!(
            stage.condition.as_ref().unwrap().to_source_string(),
            "parm5 == 1"
        );
        assert_eq!(stage.alpha_test.as_ref().unwrap().to_source_string(), "0.5");
        assert_eq!(def.coverage, Coverage::Perforated);
    }

    #[test]
    fn test_videomap_and_soundmap() {
        let def = parse("{\n\tvideomap loop video/intro.roq\n}\n{\n\tsoundmap waveform\n}\n");
        assert_eq!(def.stages.len(), 2);
        assert_eq!(
            def.stages[0].map_type,
            MapType::VideoMap { looping: true }
        );
        assert_eq!(def.stages[0].map.as_deref(), Some("video/intro.roq"));
        assert_eq!(def.stages[1].map_type, MapType::SoundMap { waveform: true });
    }

    #[test]
    fn test_render_maps() {
        let def = parse("{\n\tremoterendermap 256 128\n}\n{\n\tmirrorrendermap\n}\n");
        assert_eq!(def.stages[0].render_map_size, Some((256, 128)));
        assert_eq!(def.stages[1].map_type, MapType::MirrorRenderMap);
        assert_eq!(def.stages[1].texgen, TexGenType::Screen);
        assert_eq!(def.stages[1].render_map_size, None);
    }

    #[test]
    fn test_programs_and_parms() {
        let def = parse(
            "{\n\tmap a\n\tvertexprogram test.vfp\n\tfragmentprogram test.vfp\n\tvertexparm 0 time, 0.5\n\tfragmentmap 1 cubeMap nearest env/sky\n}\n",
        );
        let stage = &def.stages[0];
        assert_eq!(stage.vertex_program, "test.vfp");
        assert_eq!(stage.vertex_parms.len(), 1);
        assert_eq!(stage.vertex_parms[0].index, 0);
        assert_eq!(stage.vertex_parms[0].expressions.len(), 2);
        assert_eq!(stage.fragment_maps.len(), 1);
        assert_eq!(stage.fragment_maps[0].options, vec!["cubeMap", "nearest"]);
        assert_eq!(stage.fragment_maps[0].map, "env/sky");
    }

    #[test]
    fn test_vertex_parm_bounds() {
        // index out of range aborts the declaration but keeps prior state
        let def = parse("description \"kept\"\n{\n\tmap a\n\tvertexparm 9 time\n}\n");
        assert_eq!(def.description, "kept");
    }

    #[test]
    fn test_nested_map_expression() {
        let def = parse("{\n\tmap addnormals(textures/a_local, heightmap(textures/a_bmp, 6))\n}\n");
        assert_eq!(
            def.stages[0].map.as_deref(),
            Some("addnormals(textures/a_local, heightmap(textures/a_bmp, 6))")
        );
    }

    #[test]
    fn test_unknown_keyword_does_not_abort() {
        let def = parse("made_up_keyword\ndiffusemap a\n");
        assert_eq!(def.stages.len(), 1);
    }

    #[test]
    fn test_empty_stage_is_dropped() {
        let def = parse("{\n\t// nothing bindable here\n\trgb 0.5\n}\ndiffusemap a\n");
        assert_eq!(def.stages.len(), 1);
        assert_eq!(def.stages[0].stage_type, StageType::Diffuse);
    }

    #[test]
    fn test_blend_only_coverage() {
        let def = parse("{\n\tblend add\n\tmap a\n}\n");
        assert_eq!(def.coverage, Coverage::Translucent);
        assert!(def.material_flags.contains(MaterialFlags::NO_SHADOWS));

        let def = parse("{\n\tblend none\n\tmap a\n}\n");
        assert_eq!(def.coverage, Coverage::Translucent);
    }
}
