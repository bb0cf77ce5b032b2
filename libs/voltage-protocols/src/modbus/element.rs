//! Register and coil elements
//!
//! An element is a fixed-width span at a fixed address. It decodes its part
//! of a response once and fans the value out to any number of channel
//! bindings; a word element may additionally map single bits to boolean
//! channels. On the write path it reads the shadow copies of its bound
//! channels and encodes the first pending one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use voltage_channel::{Channel, ChannelAddress, ChannelValue};
use voltage_comlink::bytes::{
    f32_to_regs, f64_to_regs, i16_to_regs, i32_to_regs, i64_to_regs, regs_to_f32, regs_to_f64,
    regs_to_i16, regs_to_i32, regs_to_i64, regs_to_string, regs_to_u16, regs_to_u32, regs_to_u64,
    string_to_regs, u16_to_regs, u32_to_regs, u64_to_regs,
};
use voltage_comlink::ByteOrder;

use super::converter::Converter;
use super::error::{ConversionError, ModbusError, Result};

// ============================================================================
// Register value types
// ============================================================================

/// Scalar type decoded from a fixed number of registers
pub trait RegisterType: Clone + Send + Sync + 'static {
    const WORDS: u16;
    const KIND: &'static str;

    fn decode(regs: &[u16], order: ByteOrder) -> Option<Self>;

    fn encode(&self, order: ByteOrder) -> Vec<u16>;
}

macro_rules! register_type {
    ($ty:ty, $words:expr, $kind:expr, $decode:ident, $encode:ident) => {
        impl RegisterType for $ty {
            const WORDS: u16 = $words;
            const KIND: &'static str = $kind;

            fn decode(regs: &[u16], order: ByteOrder) -> Option<Self> {
                $decode(regs, order)
            }

            fn encode(&self, order: ByteOrder) -> Vec<u16> {
                $encode(*self, order)
            }
        }
    };
}

register_type!(u16, 1, "unsigned word", regs_to_u16, u16_to_regs);
register_type!(i16, 1, "signed word", regs_to_i16, i16_to_regs);
register_type!(u32, 2, "unsigned double word", regs_to_u32, u32_to_regs);
register_type!(i32, 2, "signed double word", regs_to_i32, i32_to_regs);
register_type!(f32, 2, "float double word", regs_to_f32, f32_to_regs);
register_type!(u64, 4, "unsigned quad word", regs_to_u64, u64_to_regs);
register_type!(i64, 4, "signed quad word", regs_to_i64, i64_to_regs);
register_type!(f64, 4, "float quad word", regs_to_f64, f64_to_regs);

/// Integer register types whose bits can be mapped individually
pub trait BitField: RegisterType {
    const BITS: u32;

    fn bit(&self, index: u8) -> bool;
}

macro_rules! bit_field {
    ($ty:ty, $unsigned:ty) => {
        impl BitField for $ty {
            const BITS: u32 = <$ty>::BITS;

            fn bit(&self, index: u8) -> bool {
                ((*self as $unsigned) >> index) & 1 == 1
            }
        }
    };
}

bit_field!(u16, u16);
bit_field!(i16, u16);
bit_field!(u32, u32);
bit_field!(i32, u32);

// ============================================================================
// Channel bindings
// ============================================================================

/// Channels already resolved in the current write phase
pub type ResolvedChannels = HashSet<ChannelAddress>;

/// Connection between an element value of type `E` and a channel
pub trait Binding<E>: Send + Sync {
    /// Push a decoded value, `None` invalidates
    fn push(&self, raw: Option<E>);

    fn shadow_copy_and_reset(&self, _resolved: &mut ResolvedChannels) {}

    /// Pending shadow copy converted to the element type
    fn pending_write(&self) -> Option<std::result::Result<E, ConversionError>> {
        None
    }

    fn discard_write(&self) {}
}

/// Binding through a [`Converter`]
pub struct ChannelBinding<E, C: ChannelValue> {
    channel: Channel<C>,
    converter: Converter<E, C>,
}

impl<E, C: ChannelValue> ChannelBinding<E, C> {
    pub fn new(channel: &Channel<C>, converter: Converter<E, C>) -> Self {
        Self {
            channel: channel.clone(),
            converter,
        }
    }
}

impl<E: Send + Sync + 'static, C: ChannelValue> Binding<E> for ChannelBinding<E, C> {
    fn push(&self, raw: Option<E>) {
        self.channel
            .set_value(raw.and_then(|raw| self.converter.element_to_channel(raw)));
    }

    /// A channel bound to several elements is resolved once per phase
    fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        if self.channel.is_writable() && resolved.insert(self.channel.address().clone()) {
            self.channel.shadow_copy_and_reset();
        }
    }

    fn pending_write(&self) -> Option<std::result::Result<E, ConversionError>> {
        self.channel
            .shadow_copy()
            .map(|value| self.converter.channel_to_element(value))
    }

    fn discard_write(&self) {
        self.channel.write_shadow_copy();
    }
}

/// Read-only mapping of one bit to a boolean channel
pub struct BitBinding {
    index: u8,
    channel: Channel<bool>,
}

impl<E: BitField> Binding<E> for BitBinding {
    fn push(&self, raw: Option<E>) {
        self.channel.set_value(raw.map(|raw| raw.bit(self.index)));
    }
}

// ============================================================================
// Elements
// ============================================================================

/// Address space an element lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSpace {
    Registers,
    Coils,
}

/// Slice of a read response belonging to one element
#[derive(Debug, Clone, Copy)]
pub enum ElementData<'a> {
    Registers(&'a [u16]),
    Coils(&'a [bool]),
}

/// Encoded value of one element, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub enum WriteData {
    Registers(Vec<u16>),
    Coils(Vec<bool>),
}

/// Consecutive failed reads of one element
#[derive(Debug, Default)]
pub struct ReadErrorCounter(AtomicU32);

impl ReadErrorCounter {
    /// Count one failure, returns the new count
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Element as seen by tasks
pub trait ModbusElement: Send + Sync {
    fn address(&self) -> u16;

    /// Width in registers or coils
    fn length(&self) -> u16;

    fn space(&self) -> ElementSpace;

    fn kind(&self) -> &'static str;

    /// Decode `data` (exactly this element's span) and push it to all
    /// bindings. Nothing is pushed if decoding fails.
    fn apply(&self, data: ElementData<'_>) -> Result<()>;

    /// Set all bound channels to "no value"
    fn invalidate(&self);

    /// Resolve the pending writes of all bound writable channels not yet
    /// in `resolved`
    fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels);

    /// Encode the first pending shadow copy of the bound channels
    fn write_data(&self) -> std::result::Result<Option<WriteData>, ConversionError>;

    /// Drop the shadow copies of the bound channels
    fn discard_write(&self);

    fn read_errors(&self) -> &ReadErrorCounter;

    fn boxed(self) -> Box<dyn ModbusElement>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

fn mismatch(kind: &str, address: u16) -> ModbusError {
    ModbusError::ResponseMismatch(format!("{kind} element at {address} received wrong data"))
}

/// First pending write wins
fn first_pending<E>(bindings: &[Box<dyn Binding<E>>]) -> Option<std::result::Result<E, ConversionError>> {
    bindings.iter().find_map(|binding| binding.pending_write())
}

/// Numeric element spanning `E::WORDS` registers
pub struct RegisterElement<E: RegisterType> {
    address: u16,
    byte_order: ByteOrder,
    bindings: Vec<Box<dyn Binding<E>>>,
    read_errors: ReadErrorCounter,
}

pub type UnsignedWordElement = RegisterElement<u16>;
pub type SignedWordElement = RegisterElement<i16>;
pub type UnsignedDoublewordElement = RegisterElement<u32>;
pub type SignedDoublewordElement = RegisterElement<i32>;
pub type FloatDoublewordElement = RegisterElement<f32>;
pub type UnsignedQuadwordElement = RegisterElement<u64>;
pub type SignedQuadwordElement = RegisterElement<i64>;
pub type FloatQuadwordElement = RegisterElement<f64>;

impl<E: RegisterType> RegisterElement<E> {
    pub fn new(address: u16) -> Self {
        Self {
            address,
            byte_order: ByteOrder::default(),
            bindings: Vec::new(),
            read_errors: ReadErrorCounter::default(),
        }
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn bind<C: ChannelValue>(self, channel: &Channel<C>, converter: Converter<E, C>) -> Self {
        self.bind_with(ChannelBinding::new(channel, converter))
    }

    pub fn bind_with(mut self, binding: impl Binding<E> + 'static) -> Self {
        self.bindings.push(Box::new(binding));
        self
    }

    fn push(&self, raw: Option<E>) {
        for binding in &self.bindings {
            binding.push(raw.clone());
        }
    }
}

impl<E: BitField> RegisterElement<E> {
    /// Map bit `index` (0 = least significant) to a boolean channel
    pub fn bit(self, index: u8, channel: &Channel<bool>) -> Result<Self> {
        if u32::from(index) >= E::BITS {
            return Err(ModbusError::InvalidBit {
                bit: index,
                width: E::BITS,
            });
        }
        Ok(self.bind_with(BitBinding {
            index,
            channel: channel.clone(),
        }))
    }
}

impl<E: RegisterType> ModbusElement for RegisterElement<E> {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        E::WORDS
    }

    fn space(&self) -> ElementSpace {
        ElementSpace::Registers
    }

    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn apply(&self, data: ElementData<'_>) -> Result<()> {
        let ElementData::Registers(regs) = data else {
            return Err(mismatch(E::KIND, self.address));
        };
        let value = E::decode(regs, self.byte_order).ok_or_else(|| mismatch(E::KIND, self.address))?;
        self.push(Some(value));
        Ok(())
    }

    fn invalidate(&self) {
        self.push(None);
    }

    fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        for binding in &self.bindings {
            binding.shadow_copy_and_reset(resolved);
        }
    }

    fn discard_write(&self) {
        for binding in &self.bindings {
            binding.discard_write();
        }
    }

    fn write_data(&self) -> std::result::Result<Option<WriteData>, ConversionError> {
        first_pending(&self.bindings)
            .transpose()
            .map(|value| value.map(|value| WriteData::Registers(value.encode(self.byte_order))))
    }

    fn read_errors(&self) -> &ReadErrorCounter {
        &self.read_errors
    }
}

/// Fixed-length ASCII block, two characters per register, NUL padded
pub struct StringElement {
    address: u16,
    words: u16,
    byte_order: ByteOrder,
    bindings: Vec<Box<dyn Binding<String>>>,
    read_errors: ReadErrorCounter,
}

impl StringElement {
    pub fn new(address: u16, words: u16) -> Self {
        Self {
            address,
            words,
            byte_order: ByteOrder::default(),
            bindings: Vec::new(),
            read_errors: ReadErrorCounter::default(),
        }
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn bind(mut self, channel: &Channel<String>, converter: Converter<String, String>) -> Self {
        self.bindings
            .push(Box::new(ChannelBinding::new(channel, converter)));
        self
    }

    fn push(&self, raw: Option<String>) {
        for binding in &self.bindings {
            binding.push(raw.clone());
        }
    }
}

impl ModbusElement for StringElement {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        self.words
    }

    fn space(&self) -> ElementSpace {
        ElementSpace::Registers
    }

    fn kind(&self) -> &'static str {
        "string"
    }

    fn apply(&self, data: ElementData<'_>) -> Result<()> {
        match data {
            ElementData::Registers(regs) if regs.len() == self.words as usize => {
                self.push(Some(regs_to_string(regs, self.byte_order)));
                Ok(())
            },
            _ => Err(mismatch("string", self.address)),
        }
    }

    fn invalidate(&self) {
        self.push(None);
    }

    fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        for binding in &self.bindings {
            binding.shadow_copy_and_reset(resolved);
        }
    }

    fn discard_write(&self) {
        for binding in &self.bindings {
            binding.discard_write();
        }
    }

    fn write_data(&self) -> std::result::Result<Option<WriteData>, ConversionError> {
        let Some(value) = first_pending(&self.bindings).transpose()? else {
            return Ok(None);
        };
        string_to_regs(&value, self.words as usize, self.byte_order)
            .map(|regs| Some(WriteData::Registers(regs)))
            .ok_or(ConversionError::OutOfRange(value))
    }

    fn read_errors(&self) -> &ReadErrorCounter {
        &self.read_errors
    }
}

/// Single coil or discrete input
pub struct CoilElement {
    address: u16,
    bindings: Vec<Box<dyn Binding<bool>>>,
    read_errors: ReadErrorCounter,
}

impl CoilElement {
    pub fn new(address: u16) -> Self {
        Self {
            address,
            bindings: Vec::new(),
            read_errors: ReadErrorCounter::default(),
        }
    }

    pub fn bind<C: ChannelValue>(mut self, channel: &Channel<C>, converter: Converter<bool, C>) -> Self {
        self.bindings
            .push(Box::new(ChannelBinding::new(channel, converter)));
        self
    }

    fn push(&self, raw: Option<bool>) {
        for binding in &self.bindings {
            binding.push(raw);
        }
    }
}

impl ModbusElement for CoilElement {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        1
    }

    fn space(&self) -> ElementSpace {
        ElementSpace::Coils
    }

    fn kind(&self) -> &'static str {
        "coil"
    }

    fn apply(&self, data: ElementData<'_>) -> Result<()> {
        match data {
            ElementData::Coils([value]) => {
                self.push(Some(*value));
                Ok(())
            },
            _ => Err(mismatch("coil", self.address)),
        }
    }

    fn invalidate(&self) {
        self.push(None);
    }

    fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        for binding in &self.bindings {
            binding.shadow_copy_and_reset(resolved);
        }
    }

    fn discard_write(&self) {
        for binding in &self.bindings {
            binding.discard_write();
        }
    }

    fn write_data(&self) -> std::result::Result<Option<WriteData>, ConversionError> {
        first_pending(&self.bindings)
            .transpose()
            .map(|value| value.map(|value| WriteData::Coils(vec![value])))
    }

    fn read_errors(&self) -> &ReadErrorCounter {
        &self.read_errors
    }
}

/// Padding for addresses a range skips
pub struct DummyElement {
    address: u16,
    length: u16,
    space: ElementSpace,
    read_errors: ReadErrorCounter,
}

impl DummyElement {
    pub fn registers(address: u16, length: u16) -> Self {
        Self {
            address,
            length,
            space: ElementSpace::Registers,
            read_errors: ReadErrorCounter::default(),
        }
    }

    pub fn coils(address: u16, length: u16) -> Self {
        Self {
            address,
            length,
            space: ElementSpace::Coils,
            read_errors: ReadErrorCounter::default(),
        }
    }
}

impl ModbusElement for DummyElement {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        self.length
    }

    fn space(&self) -> ElementSpace {
        self.space
    }

    fn kind(&self) -> &'static str {
        "dummy"
    }

    fn apply(&self, _data: ElementData<'_>) -> Result<()> {
        Ok(())
    }

    fn invalidate(&self) {}

    fn shadow_copy_and_reset(&self, _resolved: &mut ResolvedChannels) {}

    fn discard_write(&self) {}

    fn write_data(&self) -> std::result::Result<Option<WriteData>, ConversionError> {
        Ok(None)
    }

    fn read_errors(&self) -> &ReadErrorCounter {
        &self.read_errors
    }
}
