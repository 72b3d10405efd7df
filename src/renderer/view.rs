use super::{Gpu, RenderError, check};
use crate::world::{ViewerId, Viewpoint};

/// Default near-plane distance.
pub const NEAR_PLANE: f64 = 1e-3;
/// Far clip distance shared by every view.
pub const FAR_PLANE: f64 = 30.0;

/// Render the world as seen from `view`.
///
/// Sets up projection and look-at, clears depth, hands the frame to
/// `draw_world` tagged with `viewer`, then flushes.  The first graphics
/// error aborts the view and is returned.
pub fn render_view<G, V, F>(
    gpu: &mut G,
    view: &V,
    viewer: ViewerId,
    fov: f64,
    aspect: f64,
    near: f64,
    draw_world: &mut F,
) -> Result<(), RenderError>
where
    G: Gpu + ?Sized,
    V: Viewpoint + ?Sized,
    F: FnMut(&mut G, ViewerId),
{
    check(gpu, "render_view start")?;

    gpu.set_projection(fov, aspect, near, FAR_PLANE);
    check(gpu, "render_view projection")?;

    // In GL the camera never moves; the world is transformed around it.
    gpu.look_at(view.eye(), view.target(), view.up());
    check(gpu, "render_view look-at")?;

    gpu.clear_depth();
    check(gpu, "render_view clear")?;

    draw_world(gpu, viewer);
    check(gpu, "render_view draw world")?;

    gpu.flush();
    check(gpu, "render_view end")
}
