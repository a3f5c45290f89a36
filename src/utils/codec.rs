//! 寄存器编解码工具
//!
//! 应用值与16位寄存器字之间的转换。字节序与字序均为大端
//! （网络序，高字在前）：32位值占两个连续寄存器，64位值占四个。

use crate::models::register_map::RegisterDataType;
use crate::models::tag::TagValue;
use crate::utils::error::{AppError, AppResult};

/// 数据类型占用的寄存器数量：16位1个，32位2个，64位4个
pub fn register_count(data_type: RegisterDataType) -> u16 {
    match data_type {
        RegisterDataType::Uint16 | RegisterDataType::Int16 => 1,
        RegisterDataType::Uint32 | RegisterDataType::Int32 | RegisterDataType::Float32 => 2,
        RegisterDataType::Uint64 | RegisterDataType::Int64 | RegisterDataType::Float64 => 4,
    }
}

/// 将寄存器字按 decode_as 解码为应用值
pub fn decode_registers(registers: &[u16], decode_as: RegisterDataType) -> AppResult<TagValue> {
    let needed = register_count(decode_as) as usize;
    if registers.is_empty() {
        return Err(AppError::encoding_error("没有可供解码的寄存器"));
    }
    if registers.len() < needed {
        return Err(AppError::encoding_error(format!(
            "按 {} 解码需要 {} 个寄存器，实际 {} 个",
            decode_as.as_str(),
            needed,
            registers.len()
        )));
    }

    let value = match decode_as {
        RegisterDataType::Uint16 => TagValue::UInt(u64::from(registers[0])),
        RegisterDataType::Int16 => TagValue::Int(i64::from(registers[0] as i16)),
        RegisterDataType::Uint32 => TagValue::UInt(u64::from(words_to_u32(registers))),
        RegisterDataType::Int32 => TagValue::Int(i64::from(words_to_u32(registers) as i32)),
        RegisterDataType::Float32 => {
            TagValue::Float(f64::from(f32::from_bits(words_to_u32(registers))))
        }
        RegisterDataType::Uint64 => TagValue::UInt(words_to_u64(registers)),
        RegisterDataType::Int64 => TagValue::Int(words_to_u64(registers) as i64),
        RegisterDataType::Float64 => TagValue::Float(f64::from_bits(words_to_u64(registers))),
    };

    Ok(value)
}

/// 将应用值按 encode_as 编码为寄存器字
///
/// 整数类型做范围检查，越界视为编码错误（调用方在此之前已完成
/// 策略校验，这里兜底的是配置与数据类型不匹配的情况）。
pub fn encode_value(value: &TagValue, encode_as: RegisterDataType) -> AppResult<Vec<u16>> {
    let words = match encode_as {
        RegisterDataType::Uint16 => {
            let v = value
                .as_u64()
                .filter(|v| *v <= u64::from(u16::MAX))
                .ok_or_else(|| range_error(value, encode_as))?;
            vec![v as u16]
        }
        RegisterDataType::Int16 => {
            let v = value
                .as_i64()
                .filter(|v| *v >= i64::from(i16::MIN) && *v <= i64::from(i16::MAX))
                .ok_or_else(|| range_error(value, encode_as))?;
            vec![v as i16 as u16]
        }
        RegisterDataType::Uint32 => {
            let v = value
                .as_u64()
                .filter(|v| *v <= u64::from(u32::MAX))
                .ok_or_else(|| range_error(value, encode_as))?;
            u32_to_words(v as u32)
        }
        RegisterDataType::Int32 => {
            let v = value
                .as_i64()
                .filter(|v| *v >= i64::from(i32::MIN) && *v <= i64::from(i32::MAX))
                .ok_or_else(|| range_error(value, encode_as))?;
            u32_to_words(v as i32 as u32)
        }
        RegisterDataType::Float32 => u32_to_words((value.as_f64() as f32).to_bits()),
        RegisterDataType::Uint64 => {
            let v = value.as_u64().ok_or_else(|| range_error(value, encode_as))?;
            u64_to_words(v)
        }
        RegisterDataType::Int64 => {
            let v = value.as_i64().ok_or_else(|| range_error(value, encode_as))?;
            u64_to_words(v as u64)
        }
        RegisterDataType::Float64 => u64_to_words(value.as_f64().to_bits()),
    };

    Ok(words)
}

fn range_error(value: &TagValue, encode_as: RegisterDataType) -> AppError {
    AppError::encoding_error(format!(
        "值 {} 无法编码为 {}",
        value,
        encode_as.as_str()
    ))
}

// 高字在前
fn words_to_u32(registers: &[u16]) -> u32 {
    (u32::from(registers[0]) << 16) | u32::from(registers[1])
}

fn u32_to_words(v: u32) -> Vec<u16> {
    vec![(v >> 16) as u16, (v & 0xFFFF) as u16]
}

fn words_to_u64(registers: &[u16]) -> u64 {
    (u64::from(registers[0]) << 48)
        | (u64::from(registers[1]) << 32)
        | (u64::from(registers[2]) << 16)
        | u64::from(registers[3])
}

fn u64_to_words(v: u64) -> Vec<u16> {
    vec![
        (v >> 48) as u16,
        ((v >> 32) & 0xFFFF) as u16,
        ((v >> 16) & 0xFFFF) as u16,
        (v & 0xFFFF) as u16,
    ]
}
