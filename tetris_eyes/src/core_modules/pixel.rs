// THEORY (single-pixel heuristics):
// The cell classifier only ever looks at one pixel at a time, so the metrics
// it needs live here: Rec. 601 luminance for the brightness-based strategies
// and squared RGB distance for the nearest-centroid strategy. Nothing in this
// module knows about neighbors, regions or time.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type Luminance = f64;
    pub type ColorDistance = u32;

    /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
    pub fn luminance(pixel: &Rgb<Channel>) -> Luminance {
        let [r, g, b] = pixel.0;
        0.299_f64 * r as f64 + 0.587_f64 * g as f64 + 0.114_f64 * b as f64
    }

    /// Squared Euclidean distance between two RGB colors.
    pub fn color_distance(a: &Rgb<Channel>, b: &[Channel; 3]) -> ColorDistance {
        a.0.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = x as i32 - y as i32;
                (d * d) as ColorDistance
            })
            .sum()
    }
}
