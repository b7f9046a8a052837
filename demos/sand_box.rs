use bevy::prelude::*;
use granular_matter::gpu::buffers::LatestRenderView;
use granular_matter::plugin::{GranularMatterPlugin, SceneDescription, ToggleBody};
use granular_matter::{SimulationContext, SphSettings};

const RENDER_SCALE: f32 = 100.0;
const HR_RADIUS: f32 = 2.5;

fn main() {
    let settings = SphSettings { domain_width: 6.0, domain_height: 4.0, ..SphSettings::sand() };
    let scene = SceneDescription::demo(&settings);
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(GranularMatterPlugin { settings, scene })
        .add_systems(Startup, setup)
        .add_systems(Update, (controls, draw_particles))
        .run();
}

fn setup(mut commands: Commands, ctx: Res<SimulationContext>) {
    let center = Vec2::new(ctx.settings.domain_width, ctx.settings.domain_height) * 0.5 * RENDER_SCALE;
    commands.spawn((Camera2d, Transform::from_translation(center.extend(0.0))));
}

// space: pause, S: single step, 1-9: toggle rigid bodies
fn controls(
    keys: Res<ButtonInput<KeyCode>>,
    mut ctx: ResMut<SimulationContext>,
    mut toggles: EventWriter<ToggleBody>,
) {
    if keys.just_pressed(KeyCode::Space) {
        ctx.running = !ctx.running;
        info!("simulation {}", if ctx.running { "running" } else { "paused" });
    }
    if keys.just_pressed(KeyCode::KeyS) {
        ctx.single_step = true;
    }
    let digits = [
        KeyCode::Digit1,
        KeyCode::Digit2,
        KeyCode::Digit3,
        KeyCode::Digit4,
        KeyCode::Digit5,
        KeyCode::Digit6,
        KeyCode::Digit7,
        KeyCode::Digit8,
        KeyCode::Digit9,
    ];
    for (index, key) in digits.iter().enumerate() {
        if keys.just_pressed(*key) {
            toggles.write(ToggleBody(index));
        }
    }
}

fn density_color(t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        Color::srgb(0.9, 0.75 + 0.2 * t, 0.45)
    } else {
        Color::srgb(0.9, 0.85, 0.45 + 0.5 * (t - 0.5))
    }
}

fn draw_particles(mut gizmos: Gizmos, view: Res<LatestRenderView>, ctx: Res<SimulationContext>) {
    let Some(view) = &view.0 else {
        return;
    };
    let rest = ctx.settings.rest_density;
    for hr in &view.hr {
        let parent = &view.lr[hr.parent as usize];
        let pos = Vec2::from_array(hr.position) * RENDER_SCALE;
        gizmos.circle_2d(pos, HR_RADIUS, density_color(parent.rho / rest - 0.5));
    }
}
