use crate::core::FrameRGBA;
use crate::error::{CoinjarError, CoinjarResult};

pub type PremulRgba8 = [u8; 4];

/// Source-over in premultiplied alpha.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

/// Composite `src` over `dst` pixel-by-pixel. Buffers must match.
pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> CoinjarResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(CoinjarError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Destination-in against a per-pixel alpha buffer: every channel of the
/// (premultiplied) destination is scaled by `mask[i] / 255`. This is how the
/// composited jar frame is clipped to the silhouette before presentation.
pub fn mask_in_place(dst: &mut FrameRGBA, mask_alpha: &[u8]) -> CoinjarResult<()> {
    let pixels = dst.width as usize * dst.height as usize;
    if mask_alpha.len() != pixels {
        return Err(CoinjarError::render(
            "mask_in_place expects one alpha byte per destination pixel",
        ));
    }
    for (px, &m) in dst.rgba8_premul.chunks_exact_mut(4).zip(mask_alpha) {
        if m == 255 {
            continue;
        }
        for c in px.iter_mut() {
            *c = mul_div255(u16::from(*c), u16::from(m));
        }
    }
    Ok(())
}

/// Stamp `sprite` over `dst` with its top-left corner at (`dx`, `dy`) in
/// destination pixels. Off-canvas regions are clipped.
pub fn stamp_over(dst: &mut FrameRGBA, sprite: &FrameRGBA, dx: i64, dy: i64) {
    for sy in 0..sprite.height {
        let ty = dy + i64::from(sy);
        if ty < 0 || ty >= i64::from(dst.height) {
            continue;
        }
        for sx in 0..sprite.width {
            let tx = dx + i64::from(sx);
            if tx < 0 || tx >= i64::from(dst.width) {
                continue;
            }
            let s = sprite.pixel(sx, sy);
            if s[3] == 0 {
                continue;
            }
            let d = dst.pixel(tx as u32, ty as u32);
            dst.put_pixel(tx as u32, ty as u32, over(d, s, 1.0));
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
