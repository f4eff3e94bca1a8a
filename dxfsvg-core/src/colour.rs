//! AutoCAD 颜色索引（ACI）到 CSS 颜色的映射。

/// 随块颜色。
pub const BYBLOCK: i32 = 0;
/// 随层颜色。
pub const BYLAYER: i32 = 256;

const BASIC: [(u8, u8, u8); 9] = [
    (255, 0, 0),
    (255, 255, 0),
    (0, 255, 0),
    (0, 255, 255),
    (0, 0, 255),
    (255, 0, 255),
    // 7 号在白底输出中按黑色处理
    (0, 0, 0),
    (128, 128, 128),
    (192, 192, 192),
];

const GREYS: [(u8, u8, u8); 6] = [
    (51, 51, 51),
    (80, 80, 80),
    (105, 105, 105),
    (130, 130, 130),
    (190, 190, 190),
    (255, 255, 255),
];

// 10..=249 的明度档位，偶数为饱和色，奇数为浅色。
const SHADE_VALUES: [f64; 10] = [1.0, 1.0, 0.8, 0.8, 0.6, 0.6, 0.5, 0.5, 0.3, 0.3];

/// 将 ACI 索引转换为 RGB。`BYBLOCK`、`BYLAYER` 与越界值返回 `None`。
pub fn aci_to_rgb(index: i32) -> Option<(u8, u8, u8)> {
    match index {
        1..=9 => Some(BASIC[(index - 1) as usize]),
        10..=249 => {
            let hue = ((index / 10) - 1) as f64 * 15.0;
            let shade = (index % 10) as usize;
            let value = SHADE_VALUES[shade];
            let saturation = if shade % 2 == 0 { 1.0 } else { 0.5 };
            Some(hsv_to_rgb(hue, saturation, value))
        }
        250..=255 => Some(GREYS[(index - 250) as usize]),
        _ => None,
    }
}

/// 转换为 `#rrggbb`；无法解析的索引回退为黑色。
pub fn aci_to_css(index: i32) -> String {
    let (r, g, b) = aci_to_rgb(index.abs()).unwrap_or((0, 0, 0));
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let chroma = value * saturation;
    let sector = (hue / 60.0) % 6.0;
    let x = chroma * (1.0 - ((sector % 2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    let to_byte = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}
