//! Module for lua 'number' type

use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Mul, Neg, Sub};

use nom::branch::alt;
use nom::bytes::complete::take_while;
use nom::character::complete::{char, digit0, digit1, hex_digit0, one_of};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::error::{Error, ErrorKind};
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

use crate::constants::types::{LUA_FLOAT, LUA_INT, LUA_INT_UNSIGNED};
use crate::error::CannotCoerceError;
use crate::types::{CoerceFrom, LuaType};
use crate::types::value::LuaValue;

/// Lua number value, has subtypes for integers and floats
///
/// Can be converted to int with [`LuaNumber::try_int`] and to float with [`LuaNumber::as_float`]
///
/// Add, Sub, Mul and Neg follow Lua's rules directly: integer operands wrap around, any float operand makes the result a float.
/// Operations that may fail (integer division and modulo by zero) are methods returning an Option.
#[derive(Copy, Clone, Debug)]
pub enum LuaNumber {
    INT(LUA_INT),
    FLOAT(LUA_FLOAT),
}

/// Rounding mode for float to integer conversion
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FloatToInt {
    /// Only floats with an integral value convert
    Exact,
    /// Round towards negative infinity
    Floor,
    /// Round towards positive infinity
    Ceil,
}

/// 2^63 as a float; the first float above the integer range
const INT_RANGE_END: LUA_FLOAT = -(LUA_INT::MIN as LUA_FLOAT);

/// Converts a float to an integer using the specified rounding mode
///
/// Returns None if the rounded value falls outside the integer range, or if the value is NaN
pub fn float_to_int(float: LUA_FLOAT, mode: FloatToInt) -> Option<LUA_INT> {
    let rounded = match mode {
        FloatToInt::Exact => if float.floor() == float { float } else { return None; },
        FloatToInt::Floor => float.floor(),
        FloatToInt::Ceil => float.ceil(),
    };
    if rounded >= -INT_RANGE_END && rounded < INT_RANGE_END {
        Some(rounded as LUA_INT)
    } else {
        None
    }
}

impl LuaNumber {
    /// Returns the value of this number as an integer, or errors if it is a float without exact integer representation
    pub fn try_int(&self) -> Result<LUA_INT, CannotCoerceError> {
        self.to_int(FloatToInt::Exact).ok_or(CannotCoerceError { from: "float", to: "integer" })
    }

    /// Returns the value of this number as an integer, rounding floats with the specified mode
    pub fn to_int(&self, mode: FloatToInt) -> Option<LUA_INT> {
        match *self {
            LuaNumber::INT(integer) => Some(integer),
            LuaNumber::FLOAT(float) => float_to_int(float, mode),
        }
    }

    /// Returns the value of this number as a float, may lose precision when converting high-value integers to floats
    pub fn as_float(&self) -> LUA_FLOAT {
        match self {
            LuaNumber::INT(int) => *int as LUA_FLOAT,
            LuaNumber::FLOAT(float) => *float,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LuaNumber::FLOAT(_))
    }

    fn binary_op(lhs: LuaNumber, rhs: LuaNumber, intfunc: fn(LUA_INT, LUA_INT) -> LUA_INT, floatfunc: fn(LUA_FLOAT, LUA_FLOAT) -> LUA_FLOAT) -> LuaNumber {
        match (lhs, rhs) {
            (LuaNumber::INT(l_i), LuaNumber::INT(r_i)) => LuaNumber::INT(intfunc(l_i, r_i)),
            _ => LuaNumber::FLOAT(floatfunc(lhs.as_float(), rhs.as_float())),
        }
    }

    /// Float division, always yields a float
    pub fn div(self, rhs: Self) -> LuaNumber {
        LuaNumber::FLOAT(self.as_float() / rhs.as_float())
    }

    /// Exponentiation, always yields a float
    pub fn pow(self, rhs: Self) -> LuaNumber {
        LuaNumber::FLOAT(self.as_float().powf(rhs.as_float()))
    }

    /// Modulo, rounding the quotient towards negative infinity
    ///
    /// Returns None for integer modulo by zero
    pub fn modulo(self, rhs: Self) -> Option<LuaNumber> {
        match (self, rhs) {
            (LuaNumber::INT(m), LuaNumber::INT(n)) => int_mod(m, n).map(LuaNumber::INT),
            _ => Some(LuaNumber::FLOAT(float_mod(self.as_float(), rhs.as_float()))),
        }
    }

    /// Floor division
    ///
    /// Returns None for integer division by zero
    pub fn floor_div(self, rhs: Self) -> Option<LuaNumber> {
        match (self, rhs) {
            (LuaNumber::INT(m), LuaNumber::INT(n)) => int_div(m, n).map(LuaNumber::INT),
            _ => Some(LuaNumber::FLOAT((self.as_float() / rhs.as_float()).floor())),
        }
    }
}

/// Integer modulo with the sign of the divisor
pub fn int_mod(m: LUA_INT, n: LUA_INT) -> Option<LUA_INT> {
    match n {
        0 => None,
        -1 => Some(0),  // Avoids overflow of MININT % -1
        _ => {
            let r = m % n;
            if r != 0 && (r ^ n) < 0 {
                Some(r + n)
            } else {
                Some(r)
            }
        }
    }
}

/// Integer floor division
pub fn int_div(m: LUA_INT, n: LUA_INT) -> Option<LUA_INT> {
    match n {
        0 => None,
        -1 => Some(m.wrapping_neg()),
        _ => {
            let q = m / n;
            if (m ^ n) < 0 && m % n != 0 {
                Some(q - 1)
            } else {
                Some(q)
            }
        }
    }
}

/// Float modulo with the sign of the divisor
pub fn float_mod(a: LUA_FLOAT, b: LUA_FLOAT) -> LUA_FLOAT {
    let m = a % b;
    if if m > 0.0 { b < 0.0 } else { m < 0.0 && b != m } {
        m + b
    } else {
        m
    }
}

/// Left shift; Negative shift amounts shift right, shifts of the full integer width or more yield 0
pub fn shift_left(x: LUA_INT, y: LUA_INT) -> LUA_INT {
    const BITS: LUA_INT = LUA_INT::BITS as LUA_INT;
    if y <= -BITS || y >= BITS {
        0
    } else if y < 0 {
        ((x as LUA_INT_UNSIGNED) >> (-y) as u32) as LUA_INT
    } else {
        ((x as LUA_INT_UNSIGNED) << y as u32) as LUA_INT
    }
}

impl LuaType for LuaNumber {
    const TYPE_NAME: &'static str = "number";
}

/// Numbers coerce directly, strings are parsed as a numeral
impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaNumber {
    fn coerce_opt(value: &T) -> Option<Self> {
        match value.clone().into() {
            LuaValue::NUMBER(number) => Some(number),
            LuaValue::STRING(string) => str_to_number(string.as_bytes()),
            _ => None
        }
    }
}

impl From<LUA_INT> for LuaNumber {
    fn from(int: LUA_INT) -> Self {
        LuaNumber::INT(int)
    }
}

impl From<LUA_FLOAT> for LuaNumber {
    fn from(float: LUA_FLOAT) -> Self {
        LuaNumber::FLOAT(float)
    }
}

impl From<usize> for LuaNumber {
    fn from(num: usize) -> Self {
        match LUA_INT::try_from(num) {
            Ok(n) => LuaNumber::INT(n),
            Err(_) => LuaNumber::FLOAT(num as LUA_FLOAT)
        }
    }
}

impl Add for LuaNumber {
    type Output = LuaNumber;

    fn add(self, rhs: Self) -> Self::Output {
        LuaNumber::binary_op(self, rhs, LUA_INT::wrapping_add, |lhs, rhs| lhs + rhs)
    }
}

impl Sub for LuaNumber {
    type Output = LuaNumber;

    fn sub(self, rhs: Self) -> Self::Output {
        LuaNumber::binary_op(self, rhs, LUA_INT::wrapping_sub, |lhs, rhs| lhs - rhs)
    }
}

impl Mul for LuaNumber {
    type Output = LuaNumber;

    fn mul(self, rhs: Self) -> Self::Output {
        LuaNumber::binary_op(self, rhs, LUA_INT::wrapping_mul, |lhs, rhs| lhs * rhs)
    }
}

impl Neg for LuaNumber {
    type Output = LuaNumber;

    fn neg(self) -> Self::Output {
        match self {
            LuaNumber::INT(int) => LuaNumber::INT(int.wrapping_neg()),
            LuaNumber::FLOAT(float) => LuaNumber::FLOAT(-float),
        }
    }
}

/// Mathematical equality; An integer equals a float only if the float holds exactly that integer value
impl PartialEq for LuaNumber {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (LuaNumber::INT(lhs), LuaNumber::INT(rhs)) => lhs == rhs,
            (LuaNumber::FLOAT(lhs), LuaNumber::FLOAT(rhs)) => lhs == rhs,
            (LuaNumber::INT(int), LuaNumber::FLOAT(float)) | (LuaNumber::FLOAT(float), LuaNumber::INT(int)) => {
                float_to_int(float, FloatToInt::Exact) == Some(int)
            }
        }
    }
}

impl Display for LuaNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match *self {
            LuaNumber::INT(integer) => write!(f, "{}", integer),
            LuaNumber::FLOAT(float) => {
                if float.is_nan() {
                    write!(f, "{}", if float.is_sign_negative() { "-nan" } else { "nan" })
                } else if float.is_infinite() {
                    write!(f, "{}", if float < 0.0 { "-inf" } else { "inf" })
                } else if float.fract() == 0.0 && float.abs() < 1e16 {
                    write!(f, "{:.1}", float)
                } else {
                    write!(f, "{}", float)
                }
            }
        }
    }
}

fn is_lua_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

fn hex_value(digit: u8) -> u32 {
    match digit {
        b'0'..=b'9' => (digit - b'0') as u32,
        b'a'..=b'f' => (digit - b'a' + 10) as u32,
        b'A'..=b'F' => (digit - b'A' + 10) as u32,
        _ => 0,
    }
}

/// Decimal exponent with optional sign, saturating on absurdly large values
fn exponent(input: &[u8]) -> IResult<&[u8], i32> {
    map(pair(opt(one_of("+-")), digit1), |(sign, digits): (Option<char>, &[u8])| {
        let magnitude = digits.iter().fold(0i32, |acc, d| acc.saturating_mul(10).saturating_add((d - b'0') as i32));
        if sign == Some('-') { -magnitude } else { magnitude }
    })(input)
}

/// Hexadecimal numeral; Integers wrap around, a fraction or binary exponent makes it a float
fn hex_numeral(input: &[u8]) -> IResult<&[u8], LuaNumber> {
    let (input, _) = pair(char('0'), one_of("xX"))(input)?;
    let (input, int_digits) = hex_digit0(input)?;
    let (input, frac_digits) = opt(preceded(char('.'), hex_digit0))(input)?;
    if int_digits.is_empty() && frac_digits.map_or(true, |digits| digits.is_empty()) {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::HexDigit)));
    }
    let (input, exp) = opt(preceded(one_of("pP"), exponent))(input)?;

    if frac_digits.is_none() && exp.is_none() {
        let value = int_digits.iter()
            .fold(0 as LUA_INT_UNSIGNED, |acc, d| acc.wrapping_mul(16).wrapping_add(hex_value(*d) as LUA_INT_UNSIGNED));
        return Ok((input, LuaNumber::INT(value as LUA_INT)));
    }

    let mut mantissa: LUA_FLOAT = 0.0;
    let mut scale: i32 = 0;
    for digit in int_digits {
        mantissa = mantissa * 16.0 + hex_value(*digit) as LUA_FLOAT;
    }
    for digit in frac_digits.unwrap_or(&[]) {
        mantissa = mantissa * 16.0 + hex_value(*digit) as LUA_FLOAT;
        scale = scale.saturating_sub(4);
    }
    let scale = scale.saturating_add(exp.unwrap_or(0));
    Ok((input, LuaNumber::FLOAT(mantissa * (2.0 as LUA_FLOAT).powi(scale))))
}

/// Decimal numeral; Integers that do not fit become floats
fn decimal_numeral(input: &[u8]) -> IResult<&[u8], (bool, &[u8])> {
    let (input, text) = recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    Ok((input, (text.iter().all(u8::is_ascii_digit), text)))
}

fn numeral(input: &[u8]) -> IResult<&[u8], LuaNumber> {
    let (input, _) = take_while(is_lua_space)(input)?;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let negative = sign == Some('-');

    let (input, number) = match hex_numeral(input) {
        Ok((rest, number)) => (rest, if negative { -number } else { number }),
        Err(_) => {
            let (rest, (is_integer, text)) = decimal_numeral(input)?;
            let text = std::str::from_utf8(text).map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Digit)))?;
            let integer = if is_integer { text.parse::<LUA_INT_UNSIGNED>().ok() } else { None };
            let number = match integer {
                Some(value) if !negative && value <= LUA_INT::MAX as LUA_INT_UNSIGNED => LuaNumber::INT(value as LUA_INT),
                Some(value) if negative && value <= LUA_INT::MIN.unsigned_abs() => LuaNumber::INT((value as LUA_INT).wrapping_neg()),
                _ => {
                    let float = text.parse::<LUA_FLOAT>().map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Float)))?;
                    LuaNumber::FLOAT(if negative { -float } else { float })
                }
            };
            (rest, number)
        }
    };

    let (input, _) = take_while(is_lua_space)(input)?;
    Ok((input, number))
}

/// Converts a string to a number following Lua's numeral syntax
///
/// Accepts decimal and hexadecimal integers and floats, with optional sign and surrounding whitespace.
/// Hexadecimal integers wrap around; Decimal integers that do not fit are converted to float.
///
/// Returns None if the entire string is not a valid numeral
pub fn str_to_number(bytes: &[u8]) -> Option<LuaNumber> {
    all_consuming(numeral)(bytes).ok().map(|(_, number)| number)
}

#[cfg(test)]
mod tests {
    use crate::constants::types::{LUA_FLOAT, LUA_INT};
    use crate::types::value::number::{float_to_int, float_mod, int_div, int_mod, shift_left, str_to_number, FloatToInt, LuaNumber};

    fn assert_int(text: &str, expected: LUA_INT) {
        match str_to_number(text.as_bytes()) {
            Some(LuaNumber::INT(i)) => assert_eq!(i, expected, "{}", text),
            other => panic!("{:?} parsed as {:?}", text, other),
        }
    }

    fn assert_float(text: &str, expected: LUA_FLOAT) {
        match str_to_number(text.as_bytes()) {
            Some(LuaNumber::FLOAT(f)) => assert_eq!(f, expected, "{}", text),
            other => panic!("{:?} parsed as {:?}", text, other),
        }
    }

    #[test]
    fn parse_numerals() {
        assert_int("10", 10);
        assert_int("  -7\t", -7);
        assert_int("+3", 3);
        assert_int("0x10", 16);
        assert_int("0xffffffffffffffff", -1);
        assert_int("-9223372036854775808", LUA_INT::MIN);
        assert_float("9223372036854775808", 9223372036854775808.0);
        assert_float("3.0", 3.0);
        assert_float(".5", 0.5);
        assert_float("5.", 5.0);
        assert_float("1e2", 100.0);
        assert_float("-2.5E-1", -0.25);
        assert_float("0x1p4", 16.0);
        assert_float("0x.8", 0.5);
        assert_float("0xA.8p1", 21.0);
    }

    #[test]
    fn reject_invalid_numerals() {
        for text in ["", " ", "abc", "1e", "0x", "1 2", "inf", "nan", "- 1", "1..2", ".", "0x.p1", "10\0"] {
            assert!(str_to_number(text.as_bytes()).is_none(), "{:?} should not parse", text);
        }
    }

    #[test]
    fn float_conversion_bounds() {
        assert_eq!(float_to_int(3.0, FloatToInt::Exact), Some(3));
        assert_eq!(float_to_int(3.5, FloatToInt::Exact), None);
        assert_eq!(float_to_int(3.5, FloatToInt::Floor), Some(3));
        assert_eq!(float_to_int(3.5, FloatToInt::Ceil), Some(4));
        assert_eq!(float_to_int(-9223372036854775808.0, FloatToInt::Exact), Some(LUA_INT::MIN));
        assert_eq!(float_to_int(9223372036854775808.0, FloatToInt::Exact), None);
        assert_eq!(float_to_int(LUA_FLOAT::NAN, FloatToInt::Floor), None);
        assert_eq!(float_to_int(LUA_FLOAT::INFINITY, FloatToInt::Floor), None);
    }

    #[test]
    fn mixed_equality() {
        assert_eq!(LuaNumber::INT(3), LuaNumber::FLOAT(3.0));
        assert_ne!(LuaNumber::INT(3), LuaNumber::FLOAT(3.5));
        // 2^53 + 1 has no exact float representation
        assert_ne!(LuaNumber::INT((1 << 53) + 1), LuaNumber::FLOAT((1u64 << 53) as LUA_FLOAT));
        assert_ne!(LuaNumber::FLOAT(LUA_FLOAT::NAN), LuaNumber::FLOAT(LUA_FLOAT::NAN));
    }

    #[test]
    fn floor_semantics() {
        assert_eq!(int_mod(5, 3), Some(2));
        assert_eq!(int_mod(-5, 3), Some(1));
        assert_eq!(int_mod(5, -3), Some(-1));
        assert_eq!(int_mod(LUA_INT::MIN, -1), Some(0));
        assert_eq!(int_mod(1, 0), None);
        assert_eq!(int_div(7, 2), Some(3));
        assert_eq!(int_div(-7, 2), Some(-4));
        assert_eq!(int_div(LUA_INT::MIN, -1), Some(LUA_INT::MIN));
        assert_eq!(int_div(1, 0), None);
        assert_eq!(float_mod(5.5, 2.0), 1.5);
        assert_eq!(float_mod(-5.5, 2.0), 0.5);
        assert_eq!(float_mod(5.5, -2.0), -0.5);
        assert_eq!(float_mod(1.0, LUA_FLOAT::INFINITY), 1.0);
        assert_eq!(float_mod(-1.0, LUA_FLOAT::INFINITY), LUA_FLOAT::INFINITY);
    }

    #[test]
    fn shifts() {
        assert_eq!(shift_left(1, 4), 16);
        assert_eq!(shift_left(16, -4), 1);
        assert_eq!(shift_left(-1, -63), 1);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_left(1, -64), 0);
        assert_eq!(shift_left(1, 63), LUA_INT::MIN);
    }
}
